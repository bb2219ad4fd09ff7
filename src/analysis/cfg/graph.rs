//! The block graph of one function.
//!
//! [`BlockGraphBuilder`] collects blocks and edges, validates them, and computes all
//! derived structure once: predecessor lists, the dominator tree, the loop forest and
//! the block flags. The resulting [`BlockGraph`] has no mutating methods, so it can be
//! shared freely between the read-only passes that consume it.

use std::ops::Index;

use crate::{
    analysis::cfg::{
        block::{Block, BlockFlags, BlockId, SuccessorEdge},
        dominators::{self, compute_dominators},
        loops::{compute_loops, has_irreducible_cycles, Loop, LoopForest},
        traversal::depth_first,
    },
    Error::GraphError,
    Result,
};

/// Validating builder for a [`BlockGraph`].
///
/// # Examples
///
/// ```rust
/// use flatcfg::analysis::BlockGraphBuilder;
///
/// let mut builder = BlockGraphBuilder::new();
/// let head = builder.add_block()?;
/// let body = builder.add_block()?;
/// let exit = builder.add_block()?;
/// builder.add_edge(head, body, 0.9)?;
/// builder.add_edge(head, exit, 0.1)?;
/// builder.add_edge(body, head, 1.0)?;
///
/// let graph = builder.build()?;
/// assert_eq!(graph.loops().len(), 1);
/// assert!(graph[head].is_loop_header());
/// # Ok::<(), flatcfg::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockGraphBuilder {
    blocks: Vec<Block>,
    start: Option<BlockId>,
    declared_exits: Vec<(BlockId, BlockId)>,
}

impl BlockGraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty builder with room for `blocks` blocks.
    #[must_use]
    pub fn with_capacity(blocks: usize) -> Self {
        Self {
            blocks: Vec::with_capacity(blocks),
            ..Self::default()
        }
    }

    /// Returns the number of blocks added so far.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Adds a block and returns its id. Ids are dense and assigned in call order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphTooLarge`] once the id width is exhausted.
    pub fn add_block(&mut self) -> Result<BlockId> {
        let id = BlockId::try_from(self.blocks.len())?;
        self.blocks.push(Block::new(id));
        Ok(id)
    }

    /// Adds an edge `from -> to` taken with the given probability.
    ///
    /// Successor order is edge creation order; the lowering relies on it for
    /// terminators (`If` true successor first, `Switch` keys in declaration order).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if either block does not exist or the
    /// probability is outside `0.0..=1.0`.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, probability: f64) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(GraphError(format!(
                "edge {from} -> {to} has probability {probability} outside 0..=1"
            )));
        }

        self.blocks[from.index()].successors.push(SuccessorEdge {
            target: to,
            probability,
        });
        self.blocks[to.index()].predecessors.push(from);
        Ok(())
    }

    /// Sets the start block. Defaults to the first block added.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if the block does not exist.
    pub fn set_start(&mut self, block: BlockId) -> Result<()> {
        self.check(block)?;
        self.start = Some(block);
        Ok(())
    }

    /// Flags `block` as the target of an exception edge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if the block does not exist.
    pub fn mark_exception_entry(&mut self, block: BlockId) -> Result<()> {
        self.check(block)?;
        self.blocks[block.index()].flags |= BlockFlags::EXCEPTION_ENTRY;
        Ok(())
    }

    /// Declares `exit` as an exit of the loop headed by `header`.
    ///
    /// Declarations whose header turns out not to head a natural loop are dropped when
    /// the graph is built.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if either block does not exist.
    pub fn declare_loop_exit(&mut self, header: BlockId, exit: BlockId) -> Result<()> {
        self.check(header)?;
        self.check(exit)?;
        self.declared_exits.push((header, exit));
        Ok(())
    }

    /// Validates the graph and computes dominators, loops and flags.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] for a graph without blocks and
    /// [`crate::Error::GraphTooLarge`] if a dominator link does not fit the id width.
    pub fn build(self) -> Result<BlockGraph> {
        let Self {
            mut blocks,
            start,
            declared_exits,
        } = self;

        if blocks.is_empty() {
            return Err(GraphError("block graph has no blocks".to_string()));
        }
        let start = start.unwrap_or(BlockId::new(0));

        let walk = depth_first(&blocks, start);
        compute_dominators(&mut blocks, start, &walk)?;
        let loops = compute_loops(&mut blocks, &walk, &declared_exits);
        let irreducible = has_irreducible_cycles(&blocks, &walk);

        if irreducible {
            log::warn!(
                "block graph with {} blocks contains irreducible cycles",
                blocks.len()
            );
        }

        Ok(BlockGraph {
            blocks,
            start,
            loops,
            reverse_postorder: walk.reverse_postorder(),
            irreducible,
        })
    }

    fn check(&self, block: BlockId) -> Result<()> {
        if block.index() < self.blocks.len() {
            Ok(())
        } else {
            Err(GraphError(format!(
                "block {block} does not exist ({} blocks)",
                self.blocks.len()
            )))
        }
    }
}

/// An immutable control-flow graph over dense block ids.
///
/// `blocks()[i].id() == i` holds for every block. Accessors taking a [`BlockId`]
/// panic if the id does not belong to this graph, like slice indexing; use
/// [`BlockGraph::block`] for a checked lookup.
#[derive(Debug, Clone)]
pub struct BlockGraph {
    blocks: Vec<Block>,
    start: BlockId,
    loops: LoopForest,
    reverse_postorder: Vec<BlockId>,
    irreducible: bool,
}

impl BlockGraph {
    /// Returns all blocks; the index of a block is its id.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the block with the given id, if it exists.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block where execution starts.
    #[must_use]
    pub const fn start_block(&self) -> BlockId {
        self.start
    }

    /// Returns the ids of all blocks in ascending order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().map(Block::id)
    }

    /// Returns the predecessors of `block`.
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.blocks[block.index()].predecessors()
    }

    /// Returns the successors of `block` in edge order.
    pub fn successors(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[block.index()].successors()
    }

    /// Returns the immediate dominator of `block`.
    #[must_use]
    pub fn dominator(&self, block: BlockId) -> Option<BlockId> {
        self.blocks[block.index()].dominator()
    }

    /// Returns `true` if `a` dominates `b`. Every block dominates itself.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        dominators::dominates(&self.blocks, a, b)
    }

    /// Returns the blocks immediately dominated by `block`, in ascending id order.
    pub fn dominated_children(&self, block: BlockId) -> DominatedChildren<'_> {
        DominatedChildren {
            blocks: &self.blocks,
            next: self.blocks[block.index()].first_dominated,
        }
    }

    /// Returns the loop forest.
    #[must_use]
    pub fn loops(&self) -> &LoopForest {
        &self.loops
    }

    /// Returns the innermost loop containing `block`.
    #[must_use]
    pub fn loop_of(&self, block: BlockId) -> Option<&Loop> {
        self.blocks[block.index()]
            .innermost_loop()
            .and_then(|index| self.loops.get(index))
    }

    /// Returns `true` if the graph has a cycle with more than one entry.
    #[must_use]
    pub const fn has_irreducible_cycles(&self) -> bool {
        self.irreducible
    }

    /// Returns the blocks reachable from the start block, in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.reverse_postorder
    }

    /// Returns `true` if `block` is reachable from the start block.
    #[must_use]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        block == self.start || self.blocks[block.index()].dominator().is_some()
    }
}

impl Index<BlockId> for BlockGraph {
    type Output = Block;

    fn index(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }
}

/// Iterator over the dominator-tree children of a block.
#[derive(Debug, Clone)]
pub struct DominatedChildren<'a> {
    blocks: &'a [Block],
    next: Option<BlockId>,
}

impl Iterator for DominatedChildren<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        let current = self.next?;
        self.next = self.blocks[current.index()].dominated_sibling;
        Some(current)
    }
}
