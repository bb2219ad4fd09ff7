use thiserror::Error;

use crate::{analysis::BlockId, ir::NodeId};

macro_rules! lowering_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Lowering {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Lowering {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// How a node failed post-lowering verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The node belongs to a block but was never visited by the lowering.
    Missing,
    /// The node was visited more than once; carries the visit count.
    Duplicated(u32),
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationFailure::Missing => write!(f, "never lowered"),
            VerificationFailure::Duplicated(count) => write!(f, "lowered {count} times"),
        }
    }
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Invariant Violations (retryable at the compilation level)
/// - [`Error::GraphTooLarge`] - An id or dominator link does not fit the compact id width
/// - [`Error::AlreadyVisited`] - The lowering tried to emit a block twice
/// - [`Error::MissingCaseLabel`] - A dispatch target has no case label
/// - [`Error::Lowering`] - Any other internal lowering inconsistency
///
/// ## Verification
/// - [`Error::Verification`] - A block node was never lowered, or lowered twice
///
/// ## Input and Output
/// - [`Error::GraphError`] - Malformed input handed to a builder
/// - [`Error::Emit`] - The code emitter failed to write
///
/// Use [`Error::is_retryable`] to decide whether a caller may abandon this attempt and
/// retry the compilation with a less aggressive pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// An identifier does not fit the compact id representation.
    ///
    /// Raised when a block id, or a dominator-tree link pointing at a block, would
    /// exceed the fixed id width. The graph is too large for this lowering; the value
    /// is never truncated.
    #[error("Graph too large - {what} {value} exceeds the limit of {limit}")]
    GraphTooLarge {
        /// What kind of identifier overflowed
        what: &'static str,
        /// The value that did not fit
        value: usize,
        /// The largest representable value
        limit: usize,
    },

    /// A block was marked as visited a second time.
    ///
    /// The lowering strategy must never revisit a block; doing so would duplicate its
    /// code or corrupt the dispatch table.
    #[error("Block {0} was already visited")]
    AlreadyVisited(BlockId),

    /// A dispatch write targeted a block that has no case label.
    #[error("Block {0} has no case label in the dispatch table")]
    MissingCaseLabel(BlockId),

    /// An internal lowering invariant did not hold.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Lowering - {file}:{line}: {message}")]
    Lowering {
        /// The message to be printed for the Lowering error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Post-lowering verification found a node that was not lowered exactly once.
    #[error("Verification failed - node {node} was {failure}")]
    Verification {
        /// The offending node
        node: NodeId,
        /// Whether the node was missing or duplicated
        failure: VerificationFailure,
    },

    /// The input handed to a builder is malformed.
    ///
    /// Examples are an empty block list, an edge to a block that does not exist, or a
    /// terminator added to a block that already has one.
    #[error("{0}")]
    GraphError(String),

    /// The code emitter failed to write output.
    #[error("{0}")]
    Emit(#[from] std::fmt::Error),
}

impl Error {
    /// Returns `true` if the compilation may be retried with a less aggressive pipeline.
    ///
    /// Invariant violations abort this lowering, but the condition is tied to the shape
    /// of the graph the earlier phases produced, so a retry that produces a smaller or
    /// simpler graph can succeed. Verification failures and malformed input are not
    /// retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::GraphTooLarge { .. }
                | Error::AlreadyVisited(_)
                | Error::MissingCaseLabel(_)
                | Error::Lowering { .. }
        )
    }
}
