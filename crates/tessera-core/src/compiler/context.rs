//! Engine-facing entry point for predicate compilation.
//!
//! One [`CodegenContext`] is created per engine instance. It owns the
//! compilation unit every predicate is compiled into, so the lifetime of each
//! [`CompiledPredicate`] is bounded by the context that produced it; dropping
//! the context frees all generated code.
//!
//! ```no_run
//! use tessera_core::compiler::{CodegenConfig, CodegenContext};
//! use tessera_core::expr::{col, lit};
//! use tessera_core::tuple::TupleSchema;
//! use tessera_core::types::LogicalType;
//!
//! let ctx = CodegenContext::with_global(CodegenConfig::default()).unwrap();
//! let schema = TupleSchema::packed([(LogicalType::Integer, true)]);
//! match ctx.compile(&schema, &col(0).gt(lit(10_i32))) {
//!     Some(_predicate) => { /* call evaluate(&tuple) per row */ }
//!     None => { /* interpret the tree instead */ }
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use cranelift_codegen::ir::Type;
use cranelift_codegen::isa::TargetIsa;
use parking_lot::Mutex;

use super::backend::{self, Backend};
use super::config::CodegenConfig;
use super::error::{BackendError, CompileError};
use super::jit::JitContext;
use super::metrics::CompilationMetrics;
use super::pipeline::{self, CompiledPredicate};
use crate::expr::Expr;
use crate::tuple::TupleSchema;
use crate::types::LogicalType;

/// Owns the native backend handle and the compilation unit.
///
/// [`compile`](Self::compile) takes `&self`; compilations on one context are
/// serialized by an internal lock held for the whole pipeline run.
pub struct CodegenContext {
    backend: Arc<Backend>,
    unit: Mutex<JitContext>,
    config: CodegenConfig,
    metrics: CompilationMetrics,
}

impl CodegenContext {
    /// Creates a context generating code for `backend`.
    pub fn new(backend: Arc<Backend>, config: CodegenConfig) -> Self {
        let unit = JitContext::new(Arc::clone(&backend));
        tracing::debug!(triple = %backend.triple(), "codegen context created");
        Self {
            backend,
            unit: Mutex::new(unit),
            config,
            metrics: CompilationMetrics::new(),
        }
    }

    /// Creates a context on the process-wide backend.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend failed to initialize or has
    /// been shut down.
    pub fn with_global(config: CodegenConfig) -> Result<Self, BackendError> {
        Ok(Self::new(backend::global()?, config))
    }

    /// Compiles a predicate, or returns `None` if it must be interpreted.
    ///
    /// `None` covers unsupported constructs (`LIKE`, `IN`, `DOUBLE`
    /// operands), verification failures under
    /// [`VerifierPolicy::Fallback`](super::VerifierPolicy::Fallback) and
    /// internal code generation errors. The reason is logged and counted in
    /// [`metrics`](Self::metrics).
    ///
    /// # Panics
    ///
    /// Panics on a verification failure under
    /// [`VerifierPolicy::Panic`](super::VerifierPolicy::Panic).
    pub fn compile(&self, schema: &TupleSchema, expr: &Expr) -> Option<CompiledPredicate<'_>> {
        self.try_compile(schema, expr).ok()
    }

    /// Compiles a predicate, returning the reason on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`]; see [`compile`](Self::compile).
    ///
    /// # Panics
    ///
    /// Same as [`compile`](Self::compile).
    pub fn try_compile(
        &self,
        schema: &TupleSchema,
        expr: &Expr,
    ) -> Result<CompiledPredicate<'_>, CompileError> {
        let started = Instant::now();
        let result = {
            let mut unit = self.unit.lock();
            pipeline::compile_predicate(&mut unit, &self.config, schema, expr)
        };

        match result {
            Ok(code) => {
                let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
                self.metrics.record_compiled(elapsed);
                tracing::debug!(
                    predicate = %code.name,
                    timings = ?code.timings,
                    "compiled predicate"
                );
                Ok(CompiledPredicate::new(
                    code,
                    schema.tuple_length(),
                    expr.param_slots(),
                ))
            }
            Err(e) => {
                match &e {
                    e if e.is_unsupported() => {
                        self.metrics.record_fallback();
                        tracing::debug!(reason = %e, expr = %expr, "predicate not compilable, interpreting");
                    }
                    CompileError::Verification(_) => self.metrics.record_verify_failed(),
                    e => {
                        self.metrics.record_error();
                        tracing::warn!(error = %e, expr = %expr, "predicate compilation failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Returns the target ISA generated code is built for.
    pub fn isa(&self) -> &dyn TargetIsa {
        self.backend.isa()
    }

    /// Returns the native pointer type of the target.
    pub fn pointer_type(&self) -> Type {
        self.backend.isa().pointer_type()
    }

    /// Maps a logical type to the Cranelift type compiled code loads it as.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnsupportedExpr`] for a width with no
    /// Cranelift integer type.
    pub fn native_type(&self, ty: LogicalType) -> Result<Type, CompileError> {
        JitContext::native_type(ty)
    }

    /// Returns the number of functions named in this context's unit,
    /// including ones whose compilation failed.
    pub fn function_count(&self) -> u32 {
        self.unit.lock().function_count()
    }

    /// Returns the backend this context generates code for.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CodegenConfig {
        &self.config
    }

    /// Returns the compilation counters.
    pub fn metrics(&self) -> &CompilationMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for CodegenContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodegenContext")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}
