//! The IR consumed by the lowering.
//!
//! A [`Function`] is a [`BlockGraph`](crate::analysis::BlockGraph) plus an arena of
//! [`Node`]s. Nodes scheduled in a block form that block's instruction list; nodes
//! outside any block are floating values referenced by other nodes.
//!
//! # Key Components
//!
//! - [`FunctionBuilder`] - Assembles blocks, nodes and edges consistently
//! - [`Function`] - The frozen result
//! - [`NodeKind`] - The closed set of node shapes the lowering distinguishes

mod function;
mod node;

pub use function::{Function, FunctionBuilder};
pub use node::{Node, NodeId, NodeKind, PhiMove, PlainOp};
