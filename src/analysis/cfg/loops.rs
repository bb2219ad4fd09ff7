//! Natural loop analysis.
//!
//! Loops are detected structurally: an edge `latch -> header` is a back edge when the
//! header dominates the latch, and the loop body is everything that reaches a latch
//! without passing through the header.
//!
//! ```text
//!          |
//!          v
//!     [header] <------+  <- Single entry point, dominates all loop blocks
//!          |          |
//!          v          |
//!     [body ...]      |
//!          |          |
//!          v          |
//!     [latch] --------+  <- Back edge source(s), flagged LOOP_END
//!          |
//!          v
//!     [exit ...]         <- Natural exits (outside the loop, predecessor inside)
//! ```
//!
//! Besides the natural exits, each loop carries the exits *declared* by the IR through
//! `LoopExit` markers. Declared exits are conservative and may lag behind the graph
//! after optimizations, so both lists are kept. Both are sorted by block id and
//! answered with a binary search.
//!
//! Cycles that are not natural loops (several entries, no dominating header) are not
//! represented here; [`has_irreducible_cycles`] only answers whether one exists.

use std::collections::BTreeMap;

use crate::{
    analysis::cfg::{
        block::{Block, BlockFlags, BlockId},
        dominators::dominates,
        traversal::DepthFirst,
    },
    utils::BlockSet,
};

/// One natural loop of a block graph.
#[derive(Debug, Clone)]
pub struct Loop {
    index: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    depth: u32,
    header: BlockId,
    blocks: Vec<BlockId>,
    members: BlockSet,
    latches: Vec<BlockId>,
    declared_exits: Vec<BlockId>,
    natural_exits: Vec<BlockId>,
}

impl Loop {
    /// Returns the index of this loop in its [`LoopForest`].
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the index of the immediately enclosing loop.
    #[must_use]
    pub const fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Returns the indices of the loops immediately nested in this one.
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Returns the nesting depth; an outermost loop has depth 1.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the loop header.
    #[must_use]
    pub const fn header(&self) -> BlockId {
        self.header
    }

    /// Returns the member blocks, header included, in ascending id order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Returns the number of member blocks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the sources of the back edges to the header, in ascending id order.
    #[must_use]
    pub fn latches(&self) -> &[BlockId] {
        &self.latches
    }

    /// Returns the blocks declared as exits of this loop by `LoopExit` markers.
    #[must_use]
    pub fn declared_exits(&self) -> &[BlockId] {
        &self.declared_exits
    }

    /// Returns the blocks outside the loop that have a predecessor inside it.
    #[must_use]
    pub fn natural_exits(&self) -> &[BlockId] {
        &self.natural_exits
    }

    /// Returns `true` if `block` is a member of this loop.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        block.index() < self.members.capacity() && self.members.contains(block)
    }

    /// Returns `true` if `block` is one of the declared exits.
    #[must_use]
    pub fn is_declared_exit(&self, block: BlockId) -> bool {
        self.declared_exits.binary_search(&block).is_ok()
    }

    /// Returns `true` if `block` is one of the natural exits.
    #[must_use]
    pub fn is_natural_exit(&self, block: BlockId) -> bool {
        self.natural_exits.binary_search(&block).is_ok()
    }

    /// Returns `true` if no loop is nested in this one.
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns `true` if this loop is not nested in another loop.
    #[must_use]
    pub const fn is_outermost(&self) -> bool {
        self.parent.is_none()
    }
}

/// All natural loops of a block graph, ordered by header id.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<Loop>,
}

impl LoopForest {
    /// Returns the loop with the given index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Loop> {
        self.loops.get(index)
    }

    /// Returns the loop headed by `header`.
    #[must_use]
    pub fn loop_for_header(&self, header: BlockId) -> Option<&Loop> {
        self.loops
            .binary_search_by_key(&header, |l| l.header)
            .ok()
            .map(|index| &self.loops[index])
    }

    /// Returns the loops in header order.
    #[must_use]
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Returns an iterator over the loops in header order.
    pub fn iter(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter()
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if the graph has no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

/// Detects natural loops, fills in loop membership and depth on each block and sets
/// the `LOOP_HEADER` / `LOOP_END` flags.
///
/// `declared_exits` lists `(header, exit)` pairs from `LoopExit` markers. Pairs whose
/// header does not head a natural loop are dropped with a warning.
pub(crate) fn compute_loops(
    blocks: &mut [Block],
    walk: &DepthFirst,
    declared_exits: &[(BlockId, BlockId)],
) -> LoopForest {
    let block_count = blocks.len();

    // header -> (latches, body)
    let mut by_header: BTreeMap<BlockId, (Vec<BlockId>, BlockSet)> = BTreeMap::new();

    for latch in walk.reachable.iter() {
        for header in blocks[latch.index()].successors() {
            if !dominates(blocks, header, latch) {
                continue;
            }

            let (latches, body) = by_header.entry(header).or_insert_with(|| {
                let mut body = BlockSet::new(block_count);
                body.insert(header);
                (Vec::new(), body)
            });
            if !latches.contains(&latch) {
                latches.push(latch);
            }
            expand_loop_body(blocks, walk, header, latch, body);
        }
    }

    let mut loops: Vec<Loop> = by_header
        .into_iter()
        .enumerate()
        .map(|(index, (header, (mut latches, members)))| {
            latches.sort_unstable();
            let blocks_in_loop: Vec<BlockId> = members.iter().collect();
            let natural_exits = compute_natural_exits(blocks, &blocks_in_loop, &members);
            Loop {
                index,
                parent: None,
                children: Vec::new(),
                depth: 1,
                header,
                blocks: blocks_in_loop,
                members,
                latches,
                declared_exits: Vec::new(),
                natural_exits,
            }
        })
        .collect();

    compute_nesting(&mut loops);

    for &(header, exit) in declared_exits {
        match loops.binary_search_by_key(&header, |l| l.header) {
            Ok(index) => loops[index].declared_exits.push(exit),
            Err(_) => log::warn!("loop exit {exit} names {header}, which heads no loop"),
        }
    }
    for loop_info in &mut loops {
        loop_info.declared_exits.sort_unstable();
        loop_info.declared_exits.dedup();
    }

    for loop_info in &loops {
        blocks[loop_info.header.index()].flags |= BlockFlags::LOOP_HEADER;
        for latch in &loop_info.latches {
            blocks[latch.index()].flags |= BlockFlags::LOOP_END;
        }
        for block in &loop_info.blocks {
            let block = &mut blocks[block.index()];
            block.loop_depth += 1;
            let deeper = block
                .innermost_loop
                .map_or(true, |current| loops[current].depth < loop_info.depth);
            if deeper {
                block.innermost_loop = Some(loop_info.index);
            }
        }
    }

    LoopForest { loops }
}

/// Returns `true` if the graph has a cycle that is not a natural loop.
///
/// A retreating edge of the depth-first walk whose target does not dominate its
/// source enters a cycle through something other than a single dominating header.
pub(crate) fn has_irreducible_cycles(blocks: &[Block], walk: &DepthFirst) -> bool {
    walk.retreating
        .iter()
        .any(|&(source, target)| !dominates(blocks, target, source))
}

/// Adds every block that reaches `latch` without passing through `header`.
fn expand_loop_body(
    blocks: &[Block],
    walk: &DepthFirst,
    header: BlockId,
    latch: BlockId,
    body: &mut BlockSet,
) {
    let mut worklist = vec![latch];

    while let Some(block) = worklist.pop() {
        if !body.insert(block) {
            continue;
        }
        for &pred in &blocks[block.index()].predecessors {
            if pred != header && walk.reachable.contains(pred) && !body.contains(pred) {
                worklist.push(pred);
            }
        }
    }
}

fn compute_natural_exits(blocks: &[Block], body: &[BlockId], members: &BlockSet) -> Vec<BlockId> {
    let mut exits: Vec<BlockId> = body
        .iter()
        .flat_map(|block| blocks[block.index()].successors())
        .filter(|succ| !members.contains(*succ))
        .collect();
    exits.sort_unstable();
    exits.dedup();
    exits
}

/// Links each loop to the smallest other loop containing its header.
fn compute_nesting(loops: &mut [Loop]) {
    let count = loops.len();

    for i in 0..count {
        let header = loops[i].header;
        loops[i].parent = (0..count)
            .filter(|&j| j != i && loops[j].members.contains(header))
            .min_by_key(|&j| loops[j].size());
    }

    for i in 0..count {
        if let Some(parent) = loops[i].parent {
            loops[parent].children.push(i);
        }
    }

    for i in 0..count {
        let mut depth = 1;
        let mut current = loops[i].parent;
        while let Some(parent) = current {
            depth += 1;
            current = loops[parent].parent;
        }
        loops[i].depth = depth;
    }
}
