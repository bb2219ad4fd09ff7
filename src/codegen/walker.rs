//! The lowering driver.
//!
//! [`GraphWalker`] owns everything that is the same for every control-flow strategy:
//! it sets up the visited set and the node visit log, picks the straight-line path for
//! trivial functions, hands everything else to its [`ControlFlowLowering`] strategy,
//! and verifies the result. Strategies only decide the *shape* of the output and use
//! [`WalkContext`] to lower block contents.

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    analysis::BlockId,
    codegen::{
        config::LoweringConfig,
        dispatch::DispatchLoopLowering,
        emitter::CodeEmitter,
        lowerer::NodeLowerer,
        verify::{NodeVisitLog, Verifier, VisitVerifier},
        visited::VisitedSet,
    },
    ir::{Function, Node, NodeKind},
    Result,
};

/// A strategy that turns a function's control flow into structured output.
///
/// Strategies must be thread-safe (Send + Sync) so one walker can lower functions in
/// parallel.
pub trait ControlFlowLowering: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Lowers the whole function described by `ctx`.
    ///
    /// Every block must be marked visited exactly once through
    /// [`WalkContext::mark_visited`], and every block's body lowered exactly once
    /// through [`WalkContext::lower_block_body`].
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant of the lowering does not hold or the emitter
    /// fails.
    fn lower(&self, ctx: &mut WalkContext<'_>) -> Result<()>;

    /// Get a description of what this strategy does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// The control shapes a terminator is lowered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum TerminatorShape {
    /// `if (c) { .. } else { .. }` from an `If`.
    IfElse,
    /// A nested switch from a `Switch`.
    Switch,
    /// `try { .. } catch (e) { .. }` from an `InvokeWithException`.
    TryCatch,
}

impl TerminatorShape {
    /// Returns the shape a terminator kind is lowered to.
    #[must_use]
    pub const fn of(kind: &NodeKind) -> Option<Self> {
        match kind {
            NodeKind::If { .. } => Some(TerminatorShape::IfElse),
            NodeKind::Switch { .. } => Some(TerminatorShape::Switch),
            NodeKind::InvokeWithException { .. } => Some(TerminatorShape::TryCatch),
            NodeKind::Plain(_)
            | NodeKind::LoopBegin
            | NodeKind::LoopExit { .. }
            | NodeKind::LoopEnd { .. }
            | NodeKind::MergeEnd { .. }
            | NodeKind::Phi => None,
        }
    }
}

/// Counters describing one lowering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoweringStats {
    /// Name of the strategy that produced the output.
    pub strategy: &'static str,
    /// Number of case arms opened in the dispatch switch.
    pub cases: usize,
    /// Number of blocks folded into a predecessor's case.
    pub inlined_blocks: usize,
    /// Number of writes to the dispatch variable, the declaration excluded.
    pub dispatch_writes: usize,
    /// Number of loop markers left out of the output.
    pub omitted_markers: usize,
    /// Number of loop and merge ends whose phis were resolved.
    pub phi_resolutions: usize,
    /// Number of terminators lowered, per shape.
    pub terminators: [usize; TerminatorShape::COUNT],
}

impl LoweringStats {
    /// Returns how many terminators were lowered to `shape`.
    #[must_use]
    pub fn terminator_count(&self, shape: TerminatorShape) -> usize {
        self.terminators[shape as usize]
    }

    /// Counts one terminator of `shape`.
    pub fn record_terminator(&mut self, shape: TerminatorShape) {
        self.terminators[shape as usize] += 1;
    }
}

/// Per-function state handed to a [`ControlFlowLowering`].
pub struct WalkContext<'a> {
    function: &'a Function,
    config: &'a LoweringConfig,
    lowerer: &'a dyn NodeLowerer,
    out: &'a mut dyn CodeEmitter,
    visited: VisitedSet,
    visits: NodeVisitLog,
    stats: LoweringStats,
}

impl<'a> WalkContext<'a> {
    /// Creates a context with nothing visited.
    pub fn new(
        function: &'a Function,
        config: &'a LoweringConfig,
        lowerer: &'a dyn NodeLowerer,
        out: &'a mut dyn CodeEmitter,
    ) -> Self {
        Self {
            function,
            config,
            lowerer,
            out,
            visited: VisitedSet::new(function.graph().block_count()),
            visits: NodeVisitLog::new(function.node_count()),
            stats: LoweringStats::default(),
        }
    }

    /// Returns the function being lowered.
    #[must_use]
    pub fn function(&self) -> &'a Function {
        self.function
    }

    /// Returns the configuration of this lowering.
    #[must_use]
    pub fn config(&self) -> &'a LoweringConfig {
        self.config
    }

    /// Returns the node lowerer.
    #[must_use]
    pub fn lowerer(&self) -> &'a dyn NodeLowerer {
        self.lowerer
    }

    /// Returns the output emitter.
    pub fn out(&mut self) -> &mut dyn CodeEmitter {
        &mut *self.out
    }

    /// Returns `true` if `block` was already marked visited.
    #[must_use]
    pub fn visited(&self, block: BlockId) -> bool {
        self.visited.visited(block)
    }

    /// Marks `block` as visited.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AlreadyVisited`] on a second mark.
    pub fn mark_visited(&mut self, block: BlockId) -> Result<()> {
        self.visited.mark_visited(block)
    }

    /// Returns the counters collected so far.
    pub fn stats_mut(&mut self) -> &mut LoweringStats {
        &mut self.stats
    }

    /// Lowers the nodes of `block` up to its terminator and returns the terminator.
    ///
    /// Loop markers are left out (or replaced by a comment), loop and merge ends
    /// resolve their phis, and every other node the lowerer considers a statement is
    /// emitted in order. The terminator itself is counted as visited but not
    /// emitted; shaping it is the strategy's job.
    ///
    /// # Errors
    ///
    /// Propagates errors from the node lowerer and the emitter.
    pub fn lower_block_body(&mut self, block: BlockId) -> Result<Option<&'a Node>> {
        let function = self.function;
        let lowerer = self.lowerer;

        for &id in function.nodes_of(block) {
            let node = &function[id];
            self.visits.record(id);

            match node.kind() {
                NodeKind::LoopBegin | NodeKind::LoopExit { .. } => {
                    self.stats.omitted_markers += 1;
                    if self.config.annotate_markers {
                        self.out
                            .comment(&format!("{} {} omitted", node.kind().name(), id))?;
                    }
                }
                NodeKind::LoopEnd { .. } | NodeKind::MergeEnd { .. } => {
                    lowerer.resolve_phis(function, node, &mut *self.out)?;
                    self.stats.phi_resolutions += 1;
                }
                NodeKind::If { .. }
                | NodeKind::Switch { .. }
                | NodeKind::InvokeWithException { .. } => return Ok(Some(node)),
                NodeKind::Plain(_) | NodeKind::Phi => {
                    if lowerer.is_statement(function, node) {
                        lowerer.lower_statement(function, node, &mut *self.out)?;
                    }
                }
            }
        }

        Ok(None)
    }
}

/// Lowering for a function made of a single block without successors: the block is
/// emitted as straight-line code, without a dispatch loop.
struct StraightLineLowering;

impl ControlFlowLowering for StraightLineLowering {
    fn name(&self) -> &'static str {
        "straight-line"
    }

    fn lower(&self, ctx: &mut WalkContext<'_>) -> Result<()> {
        let function = ctx.function();
        let start = function.graph().start_block();
        ctx.lowerer().declare_locals(function, ctx.out())?;
        ctx.mark_visited(start)?;
        match ctx.lower_block_body(start)? {
            None => Ok(()),
            Some(node) => Err(lowering_error!(
                "single block {} ends in {} {}",
                start,
                node.kind().name(),
                node.id()
            )),
        }
    }

    fn description(&self) -> &'static str {
        "Emits a lone exit block without loop or switch"
    }
}

/// Drives the lowering of one function.
///
/// # Examples
///
/// ```rust
/// use flatcfg::prelude::*;
///
/// let mut builder = FunctionBuilder::new("empty");
/// let only = builder.add_block()?;
/// builder.append(only, NodeKind::Plain(PlainOp::effect("return", vec![])))?;
/// let function = builder.build()?;
///
/// let walker = GraphWalker::new();
/// let mut out = RecordingEmitter::new();
/// let stats = walker.lower(&function, &LoweringConfig::default(), &TextLowerer::new(), &mut out)?;
/// assert_eq!(stats.strategy, "straight-line");
/// assert_eq!(out.ops(), &[EmitOp::Statement("return;".to_string())]);
/// # Ok::<(), flatcfg::Error>(())
/// ```
pub struct GraphWalker {
    strategy: Box<dyn ControlFlowLowering>,
    verifier: Box<dyn Verifier>,
}

impl Default for GraphWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphWalker {
    /// Creates a walker using the dispatch-loop strategy and the visit-once verifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategy(Box::new(DispatchLoopLowering::new()))
    }

    /// Creates a walker using `strategy` and the visit-once verifier.
    #[must_use]
    pub fn with_strategy(strategy: Box<dyn ControlFlowLowering>) -> Self {
        Self {
            strategy,
            verifier: Box::new(VisitVerifier),
        }
    }

    /// Replaces the verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Box<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Returns the name of the configured strategy.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Lowers `function` into `out`.
    ///
    /// # Errors
    ///
    /// Returns the strategy's error for invariant violations (retryable at the
    /// compilation level) and [`crate::Error::Verification`] if a node was not lowered
    /// exactly once.
    pub fn lower(
        &self,
        function: &Function,
        config: &LoweringConfig,
        lowerer: &dyn NodeLowerer,
        out: &mut dyn CodeEmitter,
    ) -> Result<LoweringStats> {
        let graph = function.graph();
        let trivial = config.single_block_fast_path
            && graph.block_count() == 1
            && graph[graph.start_block()].successor_count() == 0;
        let strategy: &dyn ControlFlowLowering = if trivial {
            &StraightLineLowering
        } else {
            self.strategy.as_ref()
        };

        let mut ctx = WalkContext::new(function, config, lowerer, out);
        ctx.stats.strategy = strategy.name();

        if let Err(error) = strategy.lower(&mut ctx) {
            log::error!(
                "lowering '{}' with {} failed: {error}",
                function.name(),
                strategy.name()
            );
            return Err(error);
        }

        if let Some(block) = ctx.visited.first_unvisited() {
            log::error!("lowering '{}' never visited {block}", function.name());
            return Err(lowering_error!(
                "{} left block {} unvisited",
                strategy.name(),
                block
            ));
        }

        self.verifier.verify(function, &ctx.visits)?;

        let WalkContext { stats, .. } = ctx;
        log::debug!(
            "lowered '{}' ({} blocks) with {}: {} cases, {} inlined, {} dispatch writes",
            function.name(),
            graph.block_count(),
            stats.strategy,
            stats.cases,
            stats.inlined_blocks,
            stats.dispatch_writes
        );
        for shape in TerminatorShape::iter() {
            log::trace!("  {:?}: {}", shape, stats.terminator_count(shape));
        }

        Ok(stats)
    }
}
