//! Dominator computation over a block array.
//!
//! Uses the iterative algorithm by Cooper, Harvey and Kennedy ("A Simple, Fast
//! Dominance Algorithm"), iterating reachable blocks in reverse postorder until the
//! immediate dominators stop changing. Block ids are dense, so all intermediate state
//! lives in plain vectors indexed by id.
//!
//! The result is written back into the blocks:
//!
//! - `dominator` - the immediate dominator (`None` for the start block and for
//!   unreachable blocks)
//! - `dominator_depth` - distance from the start block in the dominator tree
//! - `first_dominated` / `dominated_sibling` - the children of each block as an
//!   intrusive first-child/sibling list, ordered by ascending id
//!
//! Every link is converted through [`BlockId::checked`], so a tree that points past the
//! compact id width fails with [`crate::Error::GraphTooLarge`].

use crate::{
    analysis::cfg::{
        block::{Block, BlockId},
        traversal::DepthFirst,
    },
    Result,
};

const UNDEFINED: usize = usize::MAX;

/// Computes immediate dominators and dominator-tree links for `blocks`.
///
/// `walk` must be a depth-first walk of `blocks` from `start`.
///
/// # Errors
///
/// Returns [`crate::Error::GraphTooLarge`] if a dominator link does not fit the id width.
pub(crate) fn compute_dominators(
    blocks: &mut [Block],
    start: BlockId,
    walk: &DepthFirst,
) -> Result<()> {
    let rpo = walk.reverse_postorder();

    // Position of each block in reverse postorder; UNDEFINED for unreachable blocks.
    let mut order = vec![UNDEFINED; blocks.len()];
    for (position, block) in rpo.iter().enumerate() {
        order[block.index()] = position;
    }

    // Immediate dominators, indexed by block id.
    let mut idom = vec![UNDEFINED; blocks.len()];
    idom[start.index()] = start.index();

    let mut changed = true;
    while changed {
        changed = false;

        for &block in rpo.iter().skip(1) {
            let mut new_idom = UNDEFINED;
            for &pred in &blocks[block.index()].predecessors {
                let pred = pred.index();
                if idom[pred] == UNDEFINED {
                    continue;
                }
                new_idom = if new_idom == UNDEFINED {
                    pred
                } else {
                    intersect(&idom, &order, pred, new_idom)
                };
            }

            if new_idom != UNDEFINED && idom[block.index()] != new_idom {
                idom[block.index()] = new_idom;
                changed = true;
            }
        }
    }

    // Depths follow reverse postorder: a dominator always precedes what it dominates.
    for &block in &rpo {
        let index = block.index();
        if block == start {
            blocks[index].dominator = None;
            blocks[index].dominator_depth = 0;
            continue;
        }
        let parent = idom[index];
        blocks[index].dominator = Some(BlockId::checked(parent, "dominator")?);
        blocks[index].dominator_depth = blocks[parent].dominator_depth + 1;
    }

    // Prepend children in descending id order so each list ends up ascending.
    for index in (0..blocks.len()).rev() {
        let Some(parent) = blocks[index].dominator else {
            continue;
        };
        let child = BlockId::checked(index, "dominator child")?;
        blocks[index].dominated_sibling = blocks[parent.index()].first_dominated;
        blocks[parent.index()].first_dominated = Some(child);
    }

    Ok(())
}

/// Returns `true` if `a` dominates `b` according to the links already stored in
/// `blocks`.
///
/// Every block dominates itself. Unreachable blocks dominate nothing but themselves
/// and are dominated by nothing else.
pub(crate) fn dominates(blocks: &[Block], a: BlockId, b: BlockId) -> bool {
    let target_depth = blocks[a.index()].dominator_depth;
    let mut current = b;
    while blocks[current.index()].dominator_depth > target_depth {
        match blocks[current.index()].dominator {
            Some(parent) => current = parent,
            None => return false,
        }
    }
    current == a
}

/// Walks both fingers up the partial dominator tree until they meet.
fn intersect(idom: &[usize], order: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while order[a] > order[b] {
            a = idom[a];
        }
        while order[b] > order[a] {
            b = idom[b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::{block::SuccessorEdge, traversal::depth_first};

    fn dominated(edges: &[&[u16]]) -> Vec<Block> {
        let mut blocks: Vec<Block> = (0..edges.len())
            .map(|i| Block::new(BlockId::new(i as u16)))
            .collect();
        for (from, succs) in edges.iter().enumerate() {
            for &to in *succs {
                blocks[from].successors.push(SuccessorEdge {
                    target: BlockId::new(to),
                    probability: 1.0,
                });
                blocks[to as usize].predecessors.push(BlockId::new(from as u16));
            }
        }
        let walk = depth_first(&blocks, BlockId::new(0));
        compute_dominators(&mut blocks, BlockId::new(0), &walk).unwrap();
        blocks
    }

    fn children(blocks: &[Block], parent: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut next = blocks[parent].first_dominated;
        while let Some(child) = next {
            result.push(child.index());
            next = blocks[child.index()].dominated_sibling;
        }
        result
    }

    #[test]
    fn test_dominators_diamond() {
        // 0 -> {1, 2} -> 3
        let blocks = dominated(&[&[1, 2], &[3], &[3], &[]]);

        assert_eq!(blocks[0].dominator, None);
        assert_eq!(blocks[1].dominator, Some(BlockId::new(0)));
        assert_eq!(blocks[2].dominator, Some(BlockId::new(0)));
        assert_eq!(blocks[3].dominator, Some(BlockId::new(0)));
        assert_eq!(blocks[3].dominator_depth, 1);
        assert_eq!(children(&blocks, 0), vec![1, 2, 3]);
    }

    #[test]
    fn test_dominators_loop() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let blocks = dominated(&[&[1], &[2, 3], &[1], &[]]);

        assert_eq!(blocks[2].dominator, Some(BlockId::new(1)));
        assert_eq!(blocks[3].dominator, Some(BlockId::new(1)));
        assert_eq!(blocks[2].dominator_depth, 2);
        assert_eq!(children(&blocks, 1), vec![2, 3]);
        assert!(children(&blocks, 2).is_empty());

        assert!(dominates(&blocks, BlockId::new(1), BlockId::new(2)));
        assert!(dominates(&blocks, BlockId::new(0), BlockId::new(3)));
        assert!(dominates(&blocks, BlockId::new(2), BlockId::new(2)));
        assert!(!dominates(&blocks, BlockId::new(2), BlockId::new(1)));
        assert!(!dominates(&blocks, BlockId::new(2), BlockId::new(3)));
    }

    #[test]
    fn test_dominators_unreachable_block() {
        // block 2 has no path from the start block
        let blocks = dominated(&[&[1], &[], &[1]]);

        assert_eq!(blocks[1].dominator, Some(BlockId::new(0)));
        assert_eq!(blocks[2].dominator, None);
        assert_eq!(children(&blocks, 0), vec![1]);
        assert!(!dominates(&blocks, BlockId::new(0), BlockId::new(2)));
    }

    #[test]
    fn test_dominators_irreducible() {
        // 0 -> {1, 2}, 1 <-> 2: neither cycle block dominates the other
        let blocks = dominated(&[&[1, 2], &[2], &[1]]);

        assert_eq!(blocks[1].dominator, Some(BlockId::new(0)));
        assert_eq!(blocks[2].dominator, Some(BlockId::new(0)));
    }
}
