//! Shared test infrastructure.
//!
//! - [`factories`] - ready-made functions covering the graph shapes the lowering has
//!   to handle (straight lines, merges, loops, irreducible cycles, multi-way branches,
//!   exception edges)

pub mod factories;

pub use factories::*;

use crate::{
    codegen::{GraphWalker, LoweringConfig, LoweringStats, RecordingEmitter, TextLowerer},
    ir::Function,
};

/// Lowers `function` with the default walker and records the output.
pub fn record(
    function: &Function,
    config: &LoweringConfig,
) -> (RecordingEmitter, LoweringStats) {
    let mut out = RecordingEmitter::new();
    let stats = GraphWalker::new()
        .lower(function, config, &TextLowerer::new(), &mut out)
        .expect("lowering failed");
    (out, stats)
}
