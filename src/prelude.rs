//! # flatcfg Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the flatcfg library. Import this module to get quick access to everything needed
//! to build a function and lower it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all flatcfg operations
pub use crate::Error;

/// The result type used throughout flatcfg
pub use crate::Result;

/// How a node failed verification
pub use crate::VerificationFailure;

// ================================================================================================
// Block Graph
// ================================================================================================

/// Block graph model
pub use crate::analysis::{Block, BlockFlags, BlockGraph, BlockGraphBuilder, BlockId};

/// Loop structure
pub use crate::analysis::{Loop, LoopForest};

// ================================================================================================
// IR
// ================================================================================================

/// Functions and nodes
pub use crate::ir::{Function, FunctionBuilder, Node, NodeId, NodeKind, PhiMove, PlainOp};

// ================================================================================================
// Lowering
// ================================================================================================

/// Driver, strategies and configuration
pub use crate::codegen::{
    ControlFlowLowering, DispatchLoopLowering, GraphWalker, LoweringConfig, LoweringStats,
    WalkContext,
};

/// Collaborator traits and their shipped implementations
pub use crate::codegen::{
    CodeEmitter, EmitOp, JsEmitter, NodeLowerer, RecordingEmitter, TextLowerer, Verifier,
    VisitVerifier,
};

/// Entry points
pub use crate::codegen::{lower_function, lower_functions, lower_to_source};
