//! Depth-first traversal over block arrays.
//!
//! The dominator computation needs a reverse postorder, and the reducibility check
//! needs the retreating edges of the same walk (edges whose target is still on the DFS
//! stack). Both come out of one iterative walk, so deep graphs cannot overflow the
//! call stack.

use crate::{
    analysis::cfg::block::{Block, BlockId},
    utils::BlockSet,
};

/// Result of one depth-first walk from the start block.
#[derive(Debug, Clone)]
pub(crate) struct DepthFirst {
    /// Reachable blocks in postorder.
    pub postorder: Vec<BlockId>,
    /// Edges `(source, target)` whose target was on the DFS stack when traversed.
    pub retreating: Vec<(BlockId, BlockId)>,
    /// Blocks reachable from the start block.
    pub reachable: BlockSet,
}

impl DepthFirst {
    /// Returns the reachable blocks in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        self.postorder.iter().rev().copied().collect()
    }
}

/// Walks `blocks` depth-first from `start`, visiting successors in edge order.
pub(crate) fn depth_first(blocks: &[Block], start: BlockId) -> DepthFirst {
    let mut reachable = BlockSet::new(blocks.len());
    let mut on_stack = BlockSet::new(blocks.len());
    let mut postorder = Vec::with_capacity(blocks.len());
    let mut retreating = Vec::new();

    // (block, index of the next successor to look at)
    let mut stack: Vec<(BlockId, usize)> = vec![(start, 0)];
    reachable.insert(start);
    on_stack.insert(start);

    while let Some(frame) = stack.last_mut() {
        let (block, next) = *frame;
        frame.1 += 1;

        match blocks[block.index()].successors.get(next) {
            Some(edge) => {
                let target = edge.target;
                if reachable.insert(target) {
                    on_stack.insert(target);
                    stack.push((target, 0));
                } else if on_stack.contains(target) {
                    retreating.push((block, target));
                }
            }
            None => {
                stack.pop();
                on_stack.remove(block);
                postorder.push(block);
            }
        }
    }

    DepthFirst {
        postorder,
        retreating,
        reachable,
    }
}
