//! Control-flow lowering.
//!
//! # Architecture
//!
//! ```text
//! GraphWalker ──► Box<dyn ControlFlowLowering> ──► CodeEmitter
//!     │                (DispatchLoopLowering)         ▲
//!     │                        │                      │
//!     │                        └──► NodeLowerer ──────┘
//!     └──► Verifier (every scheduled node visited exactly once)
//! ```
//!
//! - [`GraphWalker`] - Drives one function through a strategy and the verifier
//! - [`DispatchLoopLowering`] - Lowers any graph into one loop around a switch
//! - [`CodeEmitter`] - Write-only sink for structured code ([`JsEmitter`],
//!   [`RecordingEmitter`])
//! - [`NodeLowerer`] - Renders single nodes ([`TextLowerer`])
//! - [`Verifier`] - Checks the node visit log ([`VisitVerifier`])
//!
//! # Concurrency
//!
//! Lowering one function is single-threaded and owns all of its state. Independent
//! functions share nothing mutable, so [`lower_functions`] lowers them in parallel.

mod config;
mod dispatch;
mod emitter;
mod lowerer;
mod verify;
mod visited;
mod walker;

use rayon::prelude::*;

pub use config::LoweringConfig;
pub use dispatch::{DispatchLoopLowering, DispatchTable};
pub use emitter::{CodeEmitter, EmitOp, JsEmitter, RecordingEmitter};
pub use lowerer::{NodeLowerer, TextLowerer};
pub use verify::{NodeVisitLog, Verifier, VisitVerifier};
pub use visited::VisitedSet;
pub use walker::{ControlFlowLowering, GraphWalker, LoweringStats, TerminatorShape, WalkContext};

use crate::{ir::Function, Result};

/// The output of lowering one function to source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredFunction {
    /// Name of the lowered function.
    pub name: String,
    /// The emitted JavaScript.
    pub source: String,
    /// Counters describing the lowering.
    pub stats: LoweringStats,
}

/// Lowers `function` into `out` with the default [`GraphWalker`].
///
/// # Errors
///
/// See [`GraphWalker::lower`].
pub fn lower_function(
    function: &Function,
    config: &LoweringConfig,
    lowerer: &dyn NodeLowerer,
    out: &mut dyn CodeEmitter,
) -> Result<LoweringStats> {
    GraphWalker::new().lower(function, config, lowerer, out)
}

/// Lowers `function` to JavaScript source.
///
/// # Errors
///
/// See [`GraphWalker::lower`].
pub fn lower_to_source(
    function: &Function,
    config: &LoweringConfig,
    lowerer: &dyn NodeLowerer,
) -> Result<String> {
    let mut out = JsEmitter::new();
    lower_function(function, config, lowerer, &mut out)?;
    Ok(out.finish())
}

/// Lowers many functions to JavaScript source in parallel.
///
/// Each function gets its own emitter, visited set and visit log. Results are
/// returned in input order; one failing function does not affect the others.
pub fn lower_functions(
    functions: &[Function],
    config: &LoweringConfig,
    lowerer: &dyn NodeLowerer,
) -> Vec<Result<LoweredFunction>> {
    let walker = GraphWalker::new();
    functions
        .par_iter()
        .map(|function| -> Result<LoweredFunction> {
            let mut out = JsEmitter::new();
            let stats = walker.lower(function, config, lowerer, &mut out)?;
            Ok(LoweredFunction {
                name: function.name().to_string(),
                source: out.finish(),
                stats,
            })
        })
        .collect()
}
