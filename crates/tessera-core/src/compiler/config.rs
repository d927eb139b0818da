//! Compiler configuration.
//!
//! [`CodegenConfig`] is fixed when a [`CodegenContext`](super::CodegenContext)
//! is created and applies to every predicate it compiles.

/// What to do when generated IR fails structural verification.
///
/// A verification failure is a compiler bug, not a property of the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierPolicy {
    /// Abort with the verifier's diagnostics.
    Panic,
    /// Log the diagnostics and hand the predicate to the interpreter.
    Fallback,
}

impl Default for VerifierPolicy {
    /// `Panic` in debug builds, `Fallback` in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Fallback
        }
    }
}

/// Configuration for predicate compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenConfig {
    /// Run the optimization passes after verification.
    pub optimize: bool,
    /// Behavior on verification failure.
    pub verifier: VerifierPolicy,
    /// Emit IR before and after optimization at `TRACE` level.
    pub dump_ir: bool,
    /// Maximum entries in a [`PredicateCache`](super::PredicateCache).
    pub cache_capacity: usize,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            verifier: VerifierPolicy::default(),
            dump_ir: false,
            cache_capacity: 256,
        }
    }
}

impl CodegenConfig {
    /// Enables or disables the optimization passes.
    #[must_use]
    pub const fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Sets the verification failure policy.
    #[must_use]
    pub const fn with_verifier(mut self, verifier: VerifierPolicy) -> Self {
        self.verifier = verifier;
        self
    }

    /// Enables or disables IR dumps.
    #[must_use]
    pub const fn with_dump_ir(mut self, dump_ir: bool) -> Self {
        self.dump_ir = dump_ir;
        self
    }

    /// Sets the predicate cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }
}
