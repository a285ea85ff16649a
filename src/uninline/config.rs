//! Configuration for the uninlining driver.
//!
//! This module provides [`UninlineConfig`], which bounds the dataflow analysis and
//! switches the optional rewrites on and off.

use crate::{analysis::DEFAULT_MAX_ITERATIONS, codegen::ConcatStrategy};

/// Configuration for the [`Uninliner`](crate::uninline::Uninliner).
///
/// Controls the analysis bound, which kinds of replacements are produced, and how
/// string concatenations are emitted.
#[derive(Debug, Clone)]
pub struct UninlineConfig {
    /// Maximum worklist iterations per analyzed method (default: 100 000).
    pub max_analysis_iterations: usize,

    /// Rebuild bitmask values from flag constants (default: true).
    pub enable_flag_decomposition: bool,

    /// Fall back to the default group of a literal's type (default: true).
    pub enable_default_groups: bool,

    /// Turn `requireNonNull(x); pop; <literal>` into `getfield` on `x` (default: true).
    pub remove_null_checks: bool,

    /// String concatenation emission (default: [`ConcatStrategy::Auto`]).
    pub concat_strategy: ConcatStrategy,
}

impl Default for UninlineConfig {
    fn default() -> Self {
        Self {
            max_analysis_iterations: DEFAULT_MAX_ITERATIONS,
            enable_flag_decomposition: true,
            enable_default_groups: true,
            remove_null_checks: true,
            concat_strategy: ConcatStrategy::Auto,
        }
    }
}

impl UninlineConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration replacing only values mapped verbatim by named groups.
    ///
    /// No flag decomposition, no default groups and no null check removal.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            enable_flag_decomposition: false,
            enable_default_groups: false,
            remove_null_checks: false,
            ..Self::default()
        }
    }

    /// Sets the maximum number of analysis iterations per method.
    ///
    /// # Arguments
    ///
    /// * `max` - The worklist bound; methods needing more are left untouched.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_max_analysis_iterations(mut self, max: usize) -> Self {
        self.max_analysis_iterations = max;
        self
    }

    /// Enables or disables flag decomposition.
    #[must_use]
    pub fn with_flag_decomposition(mut self, enable: bool) -> Self {
        self.enable_flag_decomposition = enable;
        self
    }

    /// Enables or disables the default group fallback.
    #[must_use]
    pub fn with_default_groups(mut self, enable: bool) -> Self {
        self.enable_default_groups = enable;
        self
    }

    /// Enables or disables removal of null checks before instance constants.
    #[must_use]
    pub fn with_null_check_removal(mut self, enable: bool) -> Self {
        self.remove_null_checks = enable;
        self
    }

    /// Sets the string concatenation strategy.
    ///
    /// # Arguments
    ///
    /// * `strategy` - How replacements containing string `+` are emitted.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_concat_strategy(mut self, strategy: ConcatStrategy) -> Self {
        self.concat_strategy = strategy;
        self
    }
}
