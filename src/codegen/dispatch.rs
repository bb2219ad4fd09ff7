//! The dispatch-loop lowering.
//!
//! Every function is lowered into one loop around one switch:
//!
//! ```text
//! let control = <start>;
//! while (true) {
//!   switch (control) {
//!     case <block>: { <block body>; control = <next>; continue; }
//!     ...
//!     default: { throw new Error("unreachable"); }
//!   }
//! }
//! ```
//!
//! A block's case ends with a write of its successor's label to the dispatch variable,
//! or with the shape of its terminator (`if`/`else`, a nested switch, `try`/`catch`)
//! whose arms each end in such a write. Because every block of the graph gets a label
//! and every label gets a case, any graph can be lowered this way, irreducible ones
//! included.
//!
//! # Block inlining
//!
//! A terminator-free block with a single successor does not need a dispatch
//! round-trip when that successor has no other way in: the successor is lowered
//! directly into the same case. The successor must
//!
//! - have exactly one predecessor, and that predecessor is the current block
//! - not be the start block, which the initial dispatch targets
//! - not be visited yet
//!
//! Chains of such blocks fold into a single case. Cases are opened in block id order,
//! skipping blocks that will be folded into their predecessor's case, so the result
//! does not depend on whether a block's id is lower than its predecessor's.
//!
//! # Exit blocks
//!
//! A block without successors gets no dispatch write. Its last node is expected to
//! leave the function ([`NodeLowerer::is_exit`](crate::codegen::NodeLowerer::is_exit));
//! otherwise the case is closed with a trap rather than falling into the next one.

use crate::{
    analysis::{BlockGraph, BlockId},
    codegen::walker::{ControlFlowLowering, TerminatorShape, WalkContext},
    ir::{Node, NodeKind},
    Error, Result,
};

/// Maps blocks to the integer labels of their cases.
///
/// # Examples
///
/// ```rust
/// use flatcfg::{analysis::{BlockGraphBuilder, BlockId}, codegen::DispatchTable};
///
/// let mut builder = BlockGraphBuilder::new();
/// let a = builder.add_block()?;
/// let b = builder.add_block()?;
/// builder.add_edge(a, b, 1.0)?;
/// let graph = builder.build()?;
///
/// let table = DispatchTable::identity(&graph);
/// assert_eq!(table.label(b)?, 1);
/// assert!(table.label(BlockId::new(9)).is_err());
/// # Ok::<(), flatcfg::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable {
    labels: Vec<Option<i64>>,
}

impl DispatchTable {
    /// Labels every block with its own id.
    #[must_use]
    pub fn identity(graph: &BlockGraph) -> Self {
        Self {
            labels: graph
                .block_ids()
                .map(|block| Some(i64::from(block.raw())))
                .collect(),
        }
    }

    /// Builds a table from explicit `(block, label)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if two blocks share a label.
    pub fn from_labels(labels: impl IntoIterator<Item = (BlockId, i64)>) -> Result<Self> {
        let mut table: Vec<Option<i64>> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for (block, label) in labels {
            if !seen.insert(label) {
                return Err(Error::GraphError(format!(
                    "case label {label} assigned twice"
                )));
            }
            if table.len() <= block.index() {
                table.resize(block.index() + 1, None);
            }
            table[block.index()] = Some(label);
        }
        Ok(Self { labels: table })
    }

    /// Returns the case label of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCaseLabel`] if the block has no label.
    pub fn label(&self, block: BlockId) -> Result<i64> {
        self.labels
            .get(block.index())
            .copied()
            .flatten()
            .ok_or(Error::MissingCaseLabel(block))
    }

    /// Returns the number of labelled blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.iter().flatten().count()
    }

    /// Returns `true` if no block is labelled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowers a function into a single dispatch loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchLoopLowering;

impl DispatchLoopLowering {
    /// Creates the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Lowers the case starting at `first`, following inlinable successors.
    fn lower_case(
        &self,
        ctx: &mut WalkContext<'_>,
        table: &DispatchTable,
        first: BlockId,
    ) -> Result<()> {
        let graph = ctx.function().graph();
        let mut current = first;
        ctx.mark_visited(current)?;

        loop {
            if let Some(terminator) = ctx.lower_block_body(current)? {
                return self.lower_terminator(ctx, table, terminator);
            }

            let block = &graph[current];
            match block.successor_count() {
                0 => return self.close_exit(ctx, current),
                1 => {
                    let Some(successor) = block.successor(0) else {
                        return Err(lowering_error!("block {} lost its successor", current));
                    };
                    if !self.can_inline(ctx, current, successor) {
                        return self.dispatch(ctx, table, successor);
                    }
                    ctx.mark_visited(successor)?;
                    ctx.stats_mut().inlined_blocks += 1;
                    log::trace!("inlined {successor} into the case of {first}");
                    current = successor;
                }
                count => {
                    return Err(lowering_error!(
                        "block {} has {} successors but no terminator",
                        current,
                        count
                    ))
                }
            }
        }
    }

    fn can_inline(&self, ctx: &WalkContext<'_>, current: BlockId, successor: BlockId) -> bool {
        let graph = ctx.function().graph();
        ctx.config().inline_blocks
            && graph.predecessors(successor) == [current]
            && successor != graph.start_block()
            && !ctx.visited(successor)
    }

    /// Returns `true` if `block` will be folded into the case of its predecessor: the
    /// predecessor has no terminator and `block` as its only successor.
    ///
    /// Such a block is skipped when cases are opened in id order, so a predecessor with
    /// a higher id still gets to inline it.
    fn folds_into_predecessor(&self, ctx: &WalkContext<'_>, block: BlockId) -> bool {
        let function = ctx.function();
        let graph = function.graph();
        match graph.predecessors(block) {
            [pred] => {
                *pred != block
                    && graph[*pred].successor_count() == 1
                    && function.terminator_of(*pred).is_none()
                    && self.can_inline(ctx, *pred, block)
            }
            _ => false,
        }
    }

    /// Ends the case of an exit block. Unless the block's last node leaves the
    /// function, a trap keeps control from falling into the next case.
    fn close_exit(&self, ctx: &mut WalkContext<'_>, block: BlockId) -> Result<()> {
        let function = ctx.function();
        let exits = function
            .nodes_of(block)
            .last()
            .is_some_and(|&id| ctx.lowerer().is_exit(function, &function[id]));
        if exits {
            return Ok(());
        }
        log::trace!("{block} ends without leaving the function");
        ctx.out().unreachable(&format!("fell off the end of {block}"))
    }

    fn open_case(
        &self,
        ctx: &mut WalkContext<'_>,
        table: &DispatchTable,
        block: BlockId,
    ) -> Result<()> {
        let label = table.label(block)?;
        log::trace!("case {label} for {block}");
        ctx.out().begin_case(label)?;
        ctx.stats_mut().cases += 1;
        self.lower_case(ctx, table, block)?;
        ctx.out().end_case()
    }

    fn lower_terminator(
        &self,
        ctx: &mut WalkContext<'_>,
        table: &DispatchTable,
        node: &Node,
    ) -> Result<()> {
        let function = ctx.function();
        let lowerer = ctx.lowerer();

        match node.kind() {
            NodeKind::If {
                condition,
                true_successor,
                false_successor,
                ..
            } => {
                let condition = lowerer.value_expr(function, *condition)?;
                ctx.out().begin_if(&condition)?;
                self.dispatch(ctx, table, *true_successor)?;
                ctx.out().begin_else()?;
                self.dispatch(ctx, table, *false_successor)?;
                ctx.out().end_if()?;
            }
            NodeKind::Switch {
                value,
                keys,
                key_successors,
                default_successor,
            } => {
                let subject = lowerer.value_expr(function, *value)?;
                ctx.out().begin_switch(&subject)?;
                for (&key, &target) in keys.iter().zip(key_successors) {
                    ctx.out().begin_case(i64::from(key))?;
                    self.dispatch(ctx, table, target)?;
                    ctx.out().end_case()?;
                }
                if let Some(target) = default_successor {
                    ctx.out().begin_default()?;
                    self.dispatch(ctx, table, *target)?;
                    ctx.out().end_case()?;
                }
                ctx.out().end_switch()?;
                if default_successor.is_none() {
                    ctx.out().unreachable("no switch key matched")?;
                }
            }
            NodeKind::InvokeWithException {
                next, exception, ..
            } => {
                let binding = ctx.config().exception_binding.as_str();
                ctx.out().begin_try()?;
                lowerer.lower_statement(function, node, ctx.out())?;
                self.dispatch(ctx, table, *next)?;
                ctx.out().begin_catch(binding)?;
                self.dispatch(ctx, table, *exception)?;
                ctx.out().end_try()?;
            }
            NodeKind::Plain(_)
            | NodeKind::LoopBegin
            | NodeKind::LoopExit { .. }
            | NodeKind::LoopEnd { .. }
            | NodeKind::MergeEnd { .. }
            | NodeKind::Phi => {
                return Err(lowering_error!(
                    "{} node {} is not a terminator",
                    node.kind().name(),
                    node.id()
                ));
            }
        }

        if let Some(shape) = TerminatorShape::of(node.kind()) {
            ctx.stats_mut().record_terminator(shape);
        }
        Ok(())
    }

    /// Emits `control = <label of target>; continue`.
    fn dispatch(
        &self,
        ctx: &mut WalkContext<'_>,
        table: &DispatchTable,
        target: BlockId,
    ) -> Result<()> {
        let label = table.label(target).inspect_err(|_| {
            log::error!("dispatch to {target}, which has no case label");
        })?;
        let variable = ctx.config().dispatch_variable.as_str();
        ctx.out().assign_int(variable, label)?;
        ctx.out().continue_loop()?;
        ctx.stats_mut().dispatch_writes += 1;
        Ok(())
    }
}

impl ControlFlowLowering for DispatchLoopLowering {
    fn name(&self) -> &'static str {
        "dispatch-loop"
    }

    fn lower(&self, ctx: &mut WalkContext<'_>) -> Result<()> {
        let function = ctx.function();
        let graph = function.graph();
        let table = DispatchTable::identity(graph);
        let variable = ctx.config().dispatch_variable.as_str();

        log::debug!(
            "lowering '{}' into a dispatch loop over {} blocks",
            function.name(),
            graph.block_count()
        );

        let start = table.label(graph.start_block())?;
        ctx.out().declare_int(variable, start)?;
        ctx.lowerer().declare_locals(function, ctx.out())?;
        ctx.out().begin_loop()?;
        ctx.out().begin_switch(variable)?;

        for block in graph.block_ids() {
            if ctx.visited(block) || self.folds_into_predecessor(ctx, block) {
                continue;
            }
            self.open_case(ctx, &table, block)?;
        }
        // a cycle of blocks that each fold into the previous one has no entry case
        for block in graph.block_ids() {
            if !ctx.visited(block) {
                self.open_case(ctx, &table, block)?;
            }
        }

        ctx.out().begin_default()?;
        ctx.out().unreachable("unreachable dispatch state")?;
        ctx.out().end_case()?;
        ctx.out().end_switch()?;
        ctx.out().end_loop()
    }

    fn description(&self) -> &'static str {
        "Lowers arbitrary control flow into one loop around a switch over block labels"
    }
}
