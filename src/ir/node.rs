//! IR nodes as seen by the lowering.
//!
//! The lowering only distinguishes a handful of node shapes: control-flow terminators,
//! loop markers, merge ends and "everything else". [`NodeKind`] is a closed enum over
//! exactly those shapes, so every place that dispatches on a node is an exhaustive
//! `match`.

use std::fmt;

use strum::IntoStaticStr;

use crate::analysis::BlockId;

/// Identifier of a node in a [`Function`](crate::ir::Function)'s node arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a node id from its raw value.
    #[must_use]
    #[inline]
    pub const fn new(raw: u32) -> Self {
        NodeId(raw)
    }

    /// Returns the id as an index into the node arena.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// An operation the lowering does not interpret.
///
/// The node lowerer renders it; the lowering only decides *whether* and *where* it is
/// emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainOp {
    /// Operation name, e.g. `add` or `call foo`.
    pub mnemonic: String,
    /// Value inputs, in operand order.
    pub inputs: Vec<NodeId>,
    /// Whether the operation produces a value other nodes can reference.
    pub produces_value: bool,
}

impl PlainOp {
    /// Creates a value-producing operation.
    #[must_use]
    pub fn value(mnemonic: impl Into<String>, inputs: Vec<NodeId>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            inputs,
            produces_value: true,
        }
    }

    /// Creates an operation executed for its side effect only.
    #[must_use]
    pub fn effect(mnemonic: impl Into<String>, inputs: Vec<NodeId>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            inputs,
            produces_value: false,
        }
    }
}

/// One value transfer performed when control leaves a block through a merge or back
/// edge: `target = source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiMove {
    /// The [`NodeKind::Phi`] being written.
    pub target: NodeId,
    /// The value flowing in along this edge.
    pub source: NodeId,
}

/// The shapes of node the lowering distinguishes.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum NodeKind {
    /// Any operation without control-flow meaning.
    Plain(PlainOp),

    /// Two-way branch on a boolean value.
    If {
        /// The tested value.
        condition: NodeId,
        /// Block taken when the condition holds.
        true_successor: BlockId,
        /// Block taken otherwise.
        false_successor: BlockId,
        /// Probability of the true branch.
        true_probability: f64,
    },

    /// Multi-way branch on an integer value.
    Switch {
        /// The tested value.
        value: NodeId,
        /// Integer keys, in IR order. Keys are unique.
        keys: Vec<i32>,
        /// Successor of each key; `key_successors[i]` belongs to `keys[i]`.
        key_successors: Vec<BlockId>,
        /// Block taken when no key matches.
        default_successor: Option<BlockId>,
    },

    /// A call that continues at `next` or, if it throws, at `exception`.
    InvokeWithException {
        /// The call itself.
        call: PlainOp,
        /// Successor on normal return.
        next: BlockId,
        /// Successor receiving the thrown exception.
        exception: BlockId,
    },

    /// Marks the header of a loop.
    LoopBegin,

    /// Marks a block where control leaves the loop started by `loop_begin`.
    LoopExit {
        /// The `LoopBegin` of the loop being left.
        loop_begin: NodeId,
    },

    /// Ends a block that jumps back to the header of the loop started by `loop_begin`.
    LoopEnd {
        /// The `LoopBegin` of the loop being continued.
        loop_begin: NodeId,
        /// Values merged into the header's phis along this back edge.
        phi_moves: Vec<PhiMove>,
    },

    /// Ends a block that flows forward into a merge.
    MergeEnd {
        /// Values merged into the merge's phis along this edge.
        phi_moves: Vec<PhiMove>,
    },

    /// A value merged from several edges. Floating; written only by the phi moves of
    /// `LoopEnd` and `MergeEnd` nodes.
    Phi,
}

impl NodeKind {
    /// Returns `true` for the kinds that end a block with an explicit control shape.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            NodeKind::If { .. } | NodeKind::Switch { .. } | NodeKind::InvokeWithException { .. }
        )
    }

    /// Returns `true` for loop markers, which produce no code of their own.
    #[must_use]
    pub const fn is_loop_marker(&self) -> bool {
        matches!(self, NodeKind::LoopBegin | NodeKind::LoopExit { .. })
    }

    /// Returns the phi moves of a loop end or merge end.
    #[must_use]
    pub fn phi_moves(&self) -> Option<&[PhiMove]> {
        match self {
            NodeKind::LoopEnd { phi_moves, .. } | NodeKind::MergeEnd { phi_moves } => {
                Some(phi_moves)
            }
            _ => None,
        }
    }

    /// Returns the name of this kind, e.g. `"LoopBegin"`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// A node of the function's arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) block: Option<BlockId>,
}

impl Node {
    /// Returns the id of this node.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Returns what this node does.
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns the block this node is scheduled in, or `None` for a floating value.
    #[must_use]
    pub const fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// Returns the value inputs of this node.
    #[must_use]
    pub fn inputs(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Plain(op) | NodeKind::InvokeWithException { call: op, .. } => {
                op.inputs.clone()
            }
            NodeKind::If { condition, .. } => vec![*condition],
            NodeKind::Switch { value, .. } => vec![*value],
            NodeKind::LoopEnd { phi_moves, .. } | NodeKind::MergeEnd { phi_moves } => {
                phi_moves.iter().map(|m| m.source).collect()
            }
            NodeKind::LoopBegin | NodeKind::LoopExit { .. } | NodeKind::Phi => Vec::new(),
        }
    }
}
