//! Mark-once tracking of lowered blocks.

use crate::{analysis::BlockId, utils::BlockSet, Error, Result};

/// The set of blocks already given a place in the output.
///
/// A block is marked exactly once: either when its own case is opened or when it is
/// folded into a predecessor's case. A second mark means the lowering would emit the
/// block twice, and is reported as [`Error::AlreadyVisited`].
#[derive(Debug, Clone)]
pub struct VisitedSet {
    blocks: BlockSet,
}

impl VisitedSet {
    /// Creates a set for a graph with `block_count` blocks, none visited.
    #[must_use]
    pub fn new(block_count: usize) -> Self {
        Self {
            blocks: BlockSet::new(block_count),
        }
    }

    /// Returns `true` if `block` has been marked.
    #[must_use]
    pub fn visited(&self, block: BlockId) -> bool {
        block.index() < self.blocks.capacity() && self.blocks.contains(block)
    }

    /// Marks `block` as visited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyVisited`] if the block was marked before, and a lowering
    /// error if the block does not belong to the graph.
    pub fn mark_visited(&mut self, block: BlockId) -> Result<()> {
        if block.index() >= self.blocks.capacity() {
            return Err(lowering_error!(
                "block {} is outside a graph of {} blocks",
                block,
                self.blocks.capacity()
            ));
        }
        if !self.blocks.insert(block) {
            log::error!("block {block} was visited twice");
            return Err(Error::AlreadyVisited(block));
        }
        Ok(())
    }

    /// Returns the number of visited blocks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.blocks.count()
    }

    /// Returns the first block that has not been visited.
    #[must_use]
    pub fn first_unvisited(&self) -> Option<BlockId> {
        (0..self.blocks.capacity())
            .filter_map(|index| BlockId::try_from(index).ok())
            .find(|&block| !self.blocks.contains(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_once() {
        let mut visited = VisitedSet::new(3);
        assert!(!visited.visited(BlockId::new(1)));

        visited.mark_visited(BlockId::new(1)).unwrap();
        assert!(visited.visited(BlockId::new(1)));
        assert_eq!(visited.count(), 1);
        assert_eq!(visited.first_unvisited(), Some(BlockId::new(0)));

        assert!(matches!(
            visited.mark_visited(BlockId::new(1)),
            Err(Error::AlreadyVisited(b)) if b == BlockId::new(1)
        ));
    }

    #[test]
    fn test_out_of_range() {
        let mut visited = VisitedSet::new(2);
        assert!(!visited.visited(BlockId::new(5)));
        assert!(visited.mark_visited(BlockId::new(5)).is_err());
    }
}
