//! Control flow graph model for lowering.
//!
//! The graph is an array of basic blocks indexed by dense [`BlockId`]s. Everything the
//! lowering asks about the graph is computed once by [`BlockGraphBuilder::build`]:
//!
//! - predecessor and successor edges (successors carry a branch probability)
//! - the dominator tree, stored intrusively as first-child/sibling links
//! - the loop forest with declared and natural exits
//! - whether the graph contains irreducible cycles
//!
//! # Thread Safety
//!
//! [`BlockGraph`] is immutable after construction and is `Send + Sync`.

mod block;
mod dominators;
mod graph;
mod loops;
mod traversal;

pub use block::{Block, BlockFlags, BlockId, SuccessorEdge};
pub use graph::{BlockGraph, BlockGraphBuilder, DominatedChildren};
pub use loops::{Loop, LoopForest};
