//! Configuration for one lowering run.

/// Options controlling how a function is lowered.
///
/// Passed explicitly to every entry point; there is no global state.
///
/// # Examples
///
/// ```rust
/// use flatcfg::codegen::LoweringConfig;
///
/// let config = LoweringConfig {
///     dispatch_variable: "state".to_string(),
///     ..LoweringConfig::default()
/// };
/// assert!(config.inline_blocks);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweringConfig {
    /// Name of the dispatch variable that selects the next case.
    pub dispatch_variable: String,

    /// Name bound to the caught exception in the catch arm of an
    /// `InvokeWithException`.
    pub exception_binding: String,

    /// Fold a single-predecessor successor into its predecessor's case.
    ///
    /// Disabling this gives every block its own case, which makes the output map
    /// one-to-one onto the block graph.
    pub inline_blocks: bool,

    /// Lower a function made of one block without successors as straight-line code,
    /// without the loop and switch.
    pub single_block_fast_path: bool,

    /// Emit a comment where a loop marker was omitted.
    pub annotate_markers: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            dispatch_variable: "control".to_string(),
            exception_binding: "exception".to_string(),
            inline_blocks: true,
            single_block_fast_path: true,
            annotate_markers: true,
        }
    }
}

impl LoweringConfig {
    /// Creates a configuration producing the smallest output: no marker comments.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            annotate_markers: false,
            ..Self::default()
        }
    }

    /// Creates a configuration for inspecting the lowering: one case per block and
    /// a comment for every omitted marker.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            inline_blocks: false,
            single_block_fast_path: false,
            annotate_markers: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = LoweringConfig::default();
        assert_eq!(default.dispatch_variable, "control");
        assert_eq!(default.exception_binding, "exception");

        assert!(!LoweringConfig::compact().annotate_markers);
        assert!(LoweringConfig::compact().inline_blocks);

        let debug = LoweringConfig::debug();
        assert!(!debug.inline_blocks);
        assert!(!debug.single_block_fast_path);
        assert_eq!(debug.dispatch_variable, default.dispatch_variable);
    }
}
