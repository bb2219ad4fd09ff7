//! Post-lowering verification.
//!
//! The walker records every node it passes while lowering. Afterwards a [`Verifier`]
//! checks that record against the function: every node scheduled in a block must have
//! been visited exactly once. A node that was skipped or handled twice means the
//! output silently lost or duplicated code, so any failure aborts the lowering.

use crate::{
    ir::{Function, NodeId},
    Error, Result, VerificationFailure,
};

/// How often each node was visited during one lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVisitLog {
    counts: Vec<u32>,
}

impl NodeVisitLog {
    /// Creates an empty log for a function with `node_count` nodes.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        Self {
            counts: vec![0; node_count],
        }
    }

    /// Records one visit of `node`. Nodes outside the arena are ignored.
    pub fn record(&mut self, node: NodeId) {
        if let Some(count) = self.counts.get_mut(node.index()) {
            *count = count.saturating_add(1);
        }
    }

    /// Returns how often `node` was visited.
    #[must_use]
    pub fn count(&self, node: NodeId) -> u32 {
        self.counts.get(node.index()).copied().unwrap_or(0)
    }

    /// Returns the total number of visits.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }
}

/// Checks the visit log of a finished lowering.
pub trait Verifier: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Verifies `visits` against `function`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] naming the first offending node.
    fn verify(&self, function: &Function, visits: &NodeVisitLog) -> Result<()>;
}

/// Requires every node scheduled in a block to be visited exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisitVerifier;

impl Verifier for VisitVerifier {
    fn name(&self) -> &'static str {
        "visit-once"
    }

    fn verify(&self, function: &Function, visits: &NodeVisitLog) -> Result<()> {
        for node in function.scheduled_nodes() {
            let failure = match visits.count(node) {
                1 => continue,
                0 => VerificationFailure::Missing,
                count => VerificationFailure::Duplicated(count),
            };
            log::error!(
                "verification of '{}' failed: node {node} was {failure}",
                function.name()
            );
            return Err(Error::Verification { node, failure });
        }
        Ok(())
    }
}
