//! Basic blocks and their compact identifiers.
//!
//! Block ids are dense (`0..N`) and stored in a fixed-width `u16`. Converting a wider
//! integer into a [`BlockId`] is a checked, fallible step: a graph with more blocks
//! than the id width can express is rejected with [`Error::GraphTooLarge`] instead of
//! wrapping around.

use std::fmt;

use bitflags::bitflags;

use crate::{Error, Result};

/// A compact, dense identifier for a basic block.
///
/// Ids are assigned once, in creation order, by
/// [`BlockGraphBuilder::add_block`](crate::analysis::BlockGraphBuilder::add_block). The
/// block with id `i` is always stored at index `i` of
/// [`BlockGraph::blocks`](crate::analysis::BlockGraph::blocks).
///
/// # Examples
///
/// ```rust
/// use flatcfg::analysis::BlockId;
///
/// let id = BlockId::try_from(12usize)?;
/// assert_eq!(id.index(), 12);
/// assert!(BlockId::try_from(1usize << 20).is_err());
/// # Ok::<(), flatcfg::Error>(())
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u16);

impl BlockId {
    /// The largest index a block id can hold.
    pub const MAX_INDEX: usize = u16::MAX as usize;

    /// Creates a block id from its raw compact value.
    #[must_use]
    #[inline]
    pub const fn new(raw: u16) -> Self {
        BlockId(raw)
    }

    /// Returns the id as an index into per-block tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw compact value.
    #[must_use]
    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Converts an index into a block id for the given kind of link.
    ///
    /// `what` names the link in the error ("block id", "dominator", ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphTooLarge`] if `index` exceeds [`BlockId::MAX_INDEX`].
    pub fn checked(index: usize, what: &'static str) -> Result<Self> {
        u16::try_from(index)
            .map(BlockId)
            .map_err(|_| Error::GraphTooLarge {
                what,
                value: index,
                limit: Self::MAX_INDEX,
            })
    }
}

impl TryFrom<usize> for BlockId {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self> {
        BlockId::checked(index, "block id")
    }
}

impl From<BlockId> for usize {
    #[inline]
    fn from(block: BlockId) -> Self {
        block.index()
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

bitflags! {
    /// Structural properties of a block, derived when the graph is built.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockFlags: u8 {
        /// The block is the header of a natural loop.
        const LOOP_HEADER = 0x01;
        /// The block ends with a back edge to a loop header.
        const LOOP_END = 0x02;
        /// The block is the exception successor of an invoke.
        const EXCEPTION_ENTRY = 0x04;
    }
}

/// An outgoing control-flow edge with its branch probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuccessorEdge {
    /// The block control transfers to.
    pub target: BlockId,
    /// Probability that this edge is taken, in `0.0..=1.0`.
    pub probability: f64,
}

/// One basic block of a [`BlockGraph`](crate::analysis::BlockGraph).
///
/// Blocks are created and wired by
/// [`BlockGraphBuilder`](crate::analysis::BlockGraphBuilder) and never change afterward.
/// The dominator tree is stored intrusively: every block knows its immediate
/// dominator, the first block it immediately dominates, and its next sibling in its
/// dominator's child list.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) predecessors: Vec<BlockId>,
    pub(crate) successors: Vec<SuccessorEdge>,
    pub(crate) dominator: Option<BlockId>,
    pub(crate) first_dominated: Option<BlockId>,
    pub(crate) dominated_sibling: Option<BlockId>,
    pub(crate) dominator_depth: u32,
    pub(crate) innermost_loop: Option<usize>,
    pub(crate) loop_depth: u32,
    pub(crate) flags: BlockFlags,
}

impl Block {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            predecessors: Vec::new(),
            successors: Vec::new(),
            dominator: None,
            first_dominated: None,
            dominated_sibling: None,
            dominator_depth: 0,
            innermost_loop: None,
            loop_depth: 0,
            flags: BlockFlags::empty(),
        }
    }

    /// Returns the id of this block.
    #[must_use]
    #[inline]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the blocks with an edge into this block, in edge creation order.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Returns the number of predecessors.
    #[must_use]
    pub fn predecessor_count(&self) -> usize {
        self.predecessors.len()
    }

    /// Returns the outgoing edges of this block, in edge creation order.
    #[must_use]
    pub fn successor_edges(&self) -> &[SuccessorEdge] {
        &self.successors
    }

    /// Returns an iterator over the successor blocks.
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.successors.iter().map(|edge| edge.target)
    }

    /// Returns the number of successors.
    #[must_use]
    pub fn successor_count(&self) -> usize {
        self.successors.len()
    }

    /// Returns the successor at `index`, if any.
    #[must_use]
    pub fn successor(&self, index: usize) -> Option<BlockId> {
        self.successors.get(index).map(|edge| edge.target)
    }

    /// Returns the immediate dominator, or `None` for the start block and for blocks
    /// unreachable from it.
    #[must_use]
    pub const fn dominator(&self) -> Option<BlockId> {
        self.dominator
    }

    /// Returns the depth of this block in the dominator tree (start block = 0).
    #[must_use]
    pub const fn dominator_depth(&self) -> u32 {
        self.dominator_depth
    }

    /// Returns the index of the innermost loop containing this block.
    #[must_use]
    pub const fn innermost_loop(&self) -> Option<usize> {
        self.innermost_loop
    }

    /// Returns the number of loops containing this block (0 outside any loop).
    #[must_use]
    pub const fn loop_depth(&self) -> u32 {
        self.loop_depth
    }

    /// Returns the structural flags of this block.
    #[must_use]
    pub const fn flags(&self) -> BlockFlags {
        self.flags
    }

    /// Returns `true` if this block heads a natural loop.
    #[must_use]
    pub fn is_loop_header(&self) -> bool {
        self.flags.contains(BlockFlags::LOOP_HEADER)
    }

    /// Returns `true` if this block jumps back to a loop header.
    #[must_use]
    pub fn is_loop_end(&self) -> bool {
        self.flags.contains(BlockFlags::LOOP_END)
    }

    /// Returns `true` if this block is entered through an exception edge.
    #[must_use]
    pub fn is_exception_entry(&self) -> bool {
        self.flags.contains(BlockFlags::EXCEPTION_ENTRY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_conversions() {
        let id = BlockId::try_from(300usize).unwrap();
        assert_eq!(id.index(), 300);
        assert_eq!(id.raw(), 300);
        assert_eq!(usize::from(id), 300);
        assert_eq!(format!("{id}"), "B300");
        assert_eq!(format!("{id:?}"), "B300");
    }

    #[test]
    fn test_block_id_upper_bound() {
        assert!(BlockId::try_from(BlockId::MAX_INDEX).is_ok());

        match BlockId::try_from(BlockId::MAX_INDEX + 1) {
            Err(Error::GraphTooLarge { what, value, limit }) => {
                assert_eq!(what, "block id");
                assert_eq!(value, 65_536);
                assert_eq!(limit, 65_535);
            }
            other => panic!("expected GraphTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_checked_names_the_link() {
        let err = BlockId::checked(100_000, "dominator").unwrap_err();
        assert!(err.to_string().contains("dominator 100000"));
    }

    #[test]
    fn test_block_flags() {
        let mut block = Block::new(BlockId::new(0));
        assert!(!block.is_loop_header());
        block.flags |= BlockFlags::LOOP_HEADER | BlockFlags::EXCEPTION_ENTRY;
        assert!(block.is_loop_header());
        assert!(block.is_exception_entry());
        assert!(!block.is_loop_end());
    }
}
