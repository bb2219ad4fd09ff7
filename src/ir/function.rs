//! Functions: a block graph plus the nodes scheduled in its blocks.
//!
//! [`FunctionBuilder`] keeps the three views of a function consistent while it is
//! assembled. Appending a terminator adds the matching graph edges, appending a
//! `LoopExit` declares a loop exit, and a block accepts no further nodes once its
//! control flow has been decided.

use std::ops::Index;

use crate::{
    analysis::{BlockGraph, BlockGraphBuilder, BlockId},
    ir::node::{Node, NodeId, NodeKind, PhiMove, PlainOp},
    Error::{self, GraphError},
    Result,
};

/// A function ready for lowering.
///
/// Immutable after [`FunctionBuilder::build`]; `Send + Sync`.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    graph: BlockGraph,
    nodes: Vec<Node>,
    block_nodes: Vec<Vec<NodeId>>,
}

impl Function {
    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the block graph.
    #[must_use]
    pub const fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    /// Returns all nodes, floating values included, in id order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the node with the given id, if it exists.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Returns the number of nodes in the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the nodes scheduled in `block`, in execution order.
    ///
    /// # Panics
    ///
    /// Panics if `block` does not belong to this function.
    #[must_use]
    pub fn nodes_of(&self, block: BlockId) -> &[NodeId] {
        &self.block_nodes[block.index()]
    }

    /// Returns an iterator over every node scheduled in some block.
    pub fn scheduled_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.block_nodes.iter().flatten().copied()
    }

    /// Returns the first terminator of `block`.
    #[must_use]
    pub fn terminator_of(&self, block: BlockId) -> Option<&Node> {
        self.nodes_of(block)
            .iter()
            .map(|&id| &self[id])
            .find(|node| node.kind().is_terminator())
    }
}

impl Index<NodeId> for Function {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

/// Builder for a [`Function`].
///
/// # Examples
///
/// ```rust
/// use flatcfg::ir::{FunctionBuilder, NodeKind, PlainOp};
///
/// let mut builder = FunctionBuilder::new("abs");
/// let entry = builder.add_block()?;
/// let negate = builder.add_block()?;
/// let done = builder.add_block()?;
///
/// let x = builder.add_value(PlainOp::value("param", vec![]))?;
/// let negative = builder.add_value(PlainOp::value("lt0", vec![x]))?;
/// builder.branch_if(entry, negative, negate, done, 0.5)?;
/// builder.append(negate, NodeKind::Plain(PlainOp::effect("negate", vec![x])))?;
/// builder.jump(negate, done)?;
/// builder.append(done, NodeKind::Plain(PlainOp::effect("return", vec![x])))?;
///
/// let function = builder.build()?;
/// assert_eq!(function.graph().predecessors(done).len(), 2);
/// assert_eq!(function.nodes_of(entry).len(), 1);
/// # Ok::<(), flatcfg::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    name: String,
    graph: BlockGraphBuilder,
    nodes: Vec<Node>,
    block_nodes: Vec<Vec<NodeId>>,
    sealed: Vec<bool>,
}

impl FunctionBuilder {
    /// Creates a builder for a function called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: BlockGraphBuilder::new(),
            nodes: Vec::new(),
            block_nodes: Vec::new(),
            sealed: Vec::new(),
        }
    }

    /// Adds an empty block. The first block added is the start block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphTooLarge`] once the block id width is exhausted.
    pub fn add_block(&mut self) -> Result<BlockId> {
        let block = self.graph.add_block()?;
        self.block_nodes.push(Vec::new());
        self.sealed.push(false);
        Ok(block)
    }

    /// Sets the start block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the block does not exist.
    pub fn set_start(&mut self, block: BlockId) -> Result<()> {
        self.graph.set_start(block)
    }

    /// Adds a floating value that belongs to no block. Floating values are rendered
    /// where they are used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if an input does not exist and
    /// [`Error::GraphTooLarge`] if the node arena is full.
    pub fn add_value(&mut self, op: PlainOp) -> Result<NodeId> {
        self.check_inputs(&op.inputs)?;
        self.push_node(NodeKind::Plain(op), None)
    }

    /// Adds a floating phi, the target of the phi moves on the edges into a merge or
    /// loop header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphTooLarge`] if the node arena is full.
    pub fn add_phi(&mut self) -> Result<NodeId> {
        self.push_node(NodeKind::Phi, None)
    }

    /// Appends a node to the end of `block`.
    ///
    /// Terminators add the edges to their successors, in the order the lowering
    /// dispatches them. A `LoopExit` declares `block` an exit of the loop whose
    /// `LoopBegin` it names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the block does not exist, already ends in a
    /// terminator or jump, or if the node refers to nodes or blocks that do not exist.
    pub fn append(&mut self, block: BlockId, kind: NodeKind) -> Result<NodeId> {
        self.check_open(block)?;
        self.check_kind(&kind)?;

        match &kind {
            NodeKind::If {
                true_successor,
                false_successor,
                true_probability,
                ..
            } => {
                self.graph
                    .add_edge(block, *true_successor, *true_probability)?;
                self.graph
                    .add_edge(block, *false_successor, 1.0 - *true_probability)?;
            }
            NodeKind::Switch {
                key_successors,
                default_successor,
                ..
            } => {
                let targets: Vec<BlockId> = key_successors
                    .iter()
                    .copied()
                    .chain(*default_successor)
                    .collect();
                #[allow(clippy::cast_precision_loss)]
                let probability = 1.0 / targets.len().max(1) as f64;
                for target in targets {
                    self.graph.add_edge(block, target, probability)?;
                }
            }
            NodeKind::InvokeWithException {
                next, exception, ..
            } => {
                self.graph.add_edge(block, *next, 1.0)?;
                self.graph.add_edge(block, *exception, 0.0)?;
                self.graph.mark_exception_entry(*exception)?;
            }
            NodeKind::LoopExit { loop_begin } => {
                if let Some(header) = self.nodes[loop_begin.index()].block {
                    self.graph.declare_loop_exit(header, block)?;
                }
            }
            NodeKind::Plain(_)
            | NodeKind::LoopBegin
            | NodeKind::LoopEnd { .. }
            | NodeKind::MergeEnd { .. }
            | NodeKind::Phi => {}
        }

        let sealing = kind.is_terminator();
        let id = self.push_node(kind, Some(block))?;
        self.block_nodes[block.index()].push(id);
        self.sealed[block.index()] = sealing;
        Ok(id)
    }

    /// Ends `block` with an unconditional jump to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either block does not exist or `block` is
    /// already ended.
    pub fn jump(&mut self, block: BlockId, target: BlockId) -> Result<()> {
        self.check_open(block)?;
        self.graph.add_edge(block, target, 1.0)?;
        self.sealed[block.index()] = true;
        Ok(())
    }

    /// Ends `block` with an [`NodeKind::If`].
    ///
    /// # Errors
    ///
    /// See [`FunctionBuilder::append`].
    pub fn branch_if(
        &mut self,
        block: BlockId,
        condition: NodeId,
        true_successor: BlockId,
        false_successor: BlockId,
        true_probability: f64,
    ) -> Result<NodeId> {
        self.append(
            block,
            NodeKind::If {
                condition,
                true_successor,
                false_successor,
                true_probability,
            },
        )
    }

    /// Ends `block` with an integer [`NodeKind::Switch`] over `value`.
    ///
    /// # Errors
    ///
    /// See [`FunctionBuilder::append`]. Duplicate keys are rejected as well.
    pub fn switch(
        &mut self,
        block: BlockId,
        value: NodeId,
        cases: &[(i32, BlockId)],
        default_successor: Option<BlockId>,
    ) -> Result<NodeId> {
        self.append(
            block,
            NodeKind::Switch {
                value,
                keys: cases.iter().map(|&(key, _)| key).collect(),
                key_successors: cases.iter().map(|&(_, target)| target).collect(),
                default_successor,
            },
        )
    }

    /// Ends `block` with a call that may throw.
    ///
    /// # Errors
    ///
    /// See [`FunctionBuilder::append`].
    pub fn invoke_with_exception(
        &mut self,
        block: BlockId,
        call: PlainOp,
        next: BlockId,
        exception: BlockId,
    ) -> Result<NodeId> {
        self.append(
            block,
            NodeKind::InvokeWithException {
                call,
                next,
                exception,
            },
        )
    }

    /// Builds the block graph and freezes the function.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`BlockGraphBuilder::build`].
    pub fn build(self) -> Result<Function> {
        let graph = self.graph.build()?;
        log::debug!(
            "built function '{}' with {} blocks and {} nodes",
            self.name,
            graph.block_count(),
            self.nodes.len()
        );

        Ok(Function {
            name: self.name,
            graph,
            nodes: self.nodes,
            block_nodes: self.block_nodes,
        })
    }

    fn push_node(&mut self, kind: NodeKind, block: Option<BlockId>) -> Result<NodeId> {
        let raw = u32::try_from(self.nodes.len()).map_err(|_| Error::GraphTooLarge {
            what: "node id",
            value: self.nodes.len(),
            limit: u32::MAX as usize,
        })?;
        let id = NodeId::new(raw);
        self.nodes.push(Node { id, kind, block });
        Ok(id)
    }

    fn check_open(&self, block: BlockId) -> Result<()> {
        match self.sealed.get(block.index()) {
            None => Err(GraphError(format!("block {block} does not exist"))),
            Some(true) => Err(GraphError(format!(
                "block {block} already ends in a jump or terminator"
            ))),
            Some(false) => Ok(()),
        }
    }

    fn check_targets(&self, targets: &[BlockId]) -> Result<()> {
        match targets.iter().find(|b| b.index() >= self.sealed.len()) {
            Some(missing) => Err(GraphError(format!("block {missing} does not exist"))),
            None => Ok(()),
        }
    }

    fn check_inputs(&self, inputs: &[NodeId]) -> Result<()> {
        match inputs.iter().find(|id| id.index() >= self.nodes.len()) {
            Some(missing) => Err(GraphError(format!("node {missing} does not exist"))),
            None => Ok(()),
        }
    }

    fn check_loop_begin(&self, loop_begin: NodeId) -> Result<()> {
        match self.nodes.get(loop_begin.index()) {
            Some(node) if node.kind == NodeKind::LoopBegin => Ok(()),
            _ => Err(GraphError(format!("{loop_begin} is not a LoopBegin"))),
        }
    }

    fn check_phi_moves(&self, phi_moves: &[PhiMove]) -> Result<()> {
        let sources: Vec<NodeId> = phi_moves.iter().map(|m| m.source).collect();
        self.check_inputs(&sources)?;
        let is_phi = |id: NodeId| {
            self.nodes
                .get(id.index())
                .is_some_and(|node| node.kind == NodeKind::Phi)
        };
        match phi_moves.iter().find(|m| !is_phi(m.target)) {
            Some(phi) => Err(GraphError(format!(
                "phi move target {} is not a Phi",
                phi.target
            ))),
            None => Ok(()),
        }
    }

    fn check_kind(&self, kind: &NodeKind) -> Result<()> {
        match kind {
            NodeKind::Plain(op) => self.check_inputs(&op.inputs),
            NodeKind::InvokeWithException {
                call,
                next,
                exception,
            } => {
                self.check_targets(&[*next, *exception])?;
                self.check_inputs(&call.inputs)
            }
            NodeKind::If {
                condition,
                true_successor,
                false_successor,
                true_probability,
            } => {
                self.check_targets(&[*true_successor, *false_successor])?;
                self.check_inputs(std::slice::from_ref(condition))?;
                if (0.0..=1.0).contains(true_probability) {
                    Ok(())
                } else {
                    Err(GraphError(format!(
                        "branch probability {true_probability} outside 0..=1"
                    )))
                }
            }
            NodeKind::Switch {
                value,
                keys,
                key_successors,
                default_successor,
            } => {
                self.check_targets(key_successors)?;
                self.check_targets(default_successor.as_slice())?;
                self.check_inputs(std::slice::from_ref(value))?;
                if keys.len() != key_successors.len() {
                    return Err(GraphError(format!(
                        "switch has {} keys but {} key successors",
                        keys.len(),
                        key_successors.len()
                    )));
                }
                let mut sorted = keys.clone();
                sorted.sort_unstable();
                match sorted.windows(2).find(|pair| pair[0] == pair[1]) {
                    Some(pair) => Err(GraphError(format!("duplicate switch key {}", pair[0]))),
                    None => Ok(()),
                }
            }
            NodeKind::LoopExit { loop_begin } => self.check_loop_begin(*loop_begin),
            NodeKind::LoopEnd {
                loop_begin,
                phi_moves,
            } => {
                self.check_loop_begin(*loop_begin)?;
                self.check_phi_moves(phi_moves)
            }
            NodeKind::MergeEnd { phi_moves } => self.check_phi_moves(phi_moves),
            NodeKind::LoopBegin => Ok(()),
            NodeKind::Phi => Err(GraphError(
                "phis float and are created with add_phi".to_string(),
            )),
        }
    }
}
