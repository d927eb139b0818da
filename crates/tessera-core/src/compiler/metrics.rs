//! Compilation outcome counters.
//!
//! [`CompilationMetrics`] tracks how many predicates were compiled, declined
//! (interpreted instead), rejected by the verifier, or failed internally,
//! along with cumulative compilation time. All counters use `Relaxed`
//! ordering; they are observability values, not synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-context counters for the predicate compiler.
#[derive(Debug, Default)]
pub struct CompilationMetrics {
    compiled: AtomicU64,
    fallback: AtomicU64,
    verify_failed: AtomicU64,
    errored: AtomicU64,
    compile_time_total_ns: AtomicU64,
}

impl CompilationMetrics {
    /// Creates a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful compilation.
    pub fn record_compiled(&self, compile_time_ns: u64) {
        self.compiled.fetch_add(1, Ordering::Relaxed);
        self.compile_time_total_ns
            .fetch_add(compile_time_ns, Ordering::Relaxed);
    }

    /// Records a predicate declined as unsupported.
    pub fn record_fallback(&self) {
        self.fallback.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a verification failure.
    pub fn record_verify_failed(&self) {
        self.verify_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records any other compilation error.
    pub fn record_error(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of compiled predicates.
    #[must_use]
    pub fn compiled_count(&self) -> u64 {
        self.compiled.load(Ordering::Relaxed)
    }

    /// Returns the number of predicates declined as unsupported.
    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.fallback.load(Ordering::Relaxed)
    }

    /// Returns the number of verification failures.
    #[must_use]
    pub fn verify_failed_count(&self) -> u64 {
        self.verify_failed.load(Ordering::Relaxed)
    }

    /// Returns the number of other compilation errors.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.errored.load(Ordering::Relaxed)
    }

    /// Takes a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            compiled: self.compiled_count(),
            fallback: self.fallback_count(),
            verify_failed: self.verify_failed_count(),
            errored: self.error_count(),
            compile_time_total_ns: self.compile_time_total_ns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`CompilationMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Predicates compiled to native code.
    pub compiled: u64,
    /// Predicates declined as unsupported.
    pub fallback: u64,
    /// Predicates whose IR failed verification.
    pub verify_failed: u64,
    /// Predicates that failed for any other reason.
    pub errored: u64,
    /// Total time spent in successful compilations (nanoseconds).
    pub compile_time_total_ns: u64,
}

impl MetricsSnapshot {
    /// Returns the number of compilation attempts across all outcomes.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.compiled + self.fallback + self.verify_failed + self.errored
    }

    /// Returns the fraction of attempts that produced native code (0.0–1.0).
    ///
    /// Returns 0.0 if nothing has been compiled yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compilation_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.compiled as f64 / total as f64
    }
}
