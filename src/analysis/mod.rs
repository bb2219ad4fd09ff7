//! Graph analysis consumed by the lowering.
//!
//! # Architecture
//!
//! - [`cfg`] - Block graph construction, dominators and loops
//!
//! # Usage
//!
//! ```rust
//! use flatcfg::analysis::BlockGraphBuilder;
//!
//! let mut builder = BlockGraphBuilder::new();
//! let entry = builder.add_block()?;
//! let left = builder.add_block()?;
//! let right = builder.add_block()?;
//! builder.add_edge(entry, left, 0.5)?;
//! builder.add_edge(entry, right, 0.5)?;
//! builder.add_edge(left, right, 1.0)?;
//!
//! let graph = builder.build()?;
//! assert!(graph.dominates(entry, right));
//! assert_eq!(graph.predecessors(right).len(), 2);
//! # Ok::<(), flatcfg::Error>(())
//! ```

pub mod cfg;

pub use cfg::{
    Block, BlockFlags, BlockGraph, BlockGraphBuilder, BlockId, DominatedChildren, Loop,
    LoopForest, SuccessorEdge,
};
