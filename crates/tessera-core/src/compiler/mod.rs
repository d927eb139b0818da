//! Predicate compiler: WHERE-clause trees to native code via Cranelift.
//!
//! The engine hands a [`CodegenContext`] an [`Expr`](crate::expr::Expr) and
//! the [`TupleSchema`](crate::tuple::TupleSchema) of the rows it will filter.
//! The result is a [`CompiledPredicate`] wrapping an
//! `extern "C" fn(*const u8) -> i8` that returns the tri-state encoding of
//! [`TriBool`](crate::types::TriBool), or `None` when the tree must be
//! interpreted.
//!
//! # Components
//!
//! - [`backend`]: process-wide native backend (target ISA)
//! - [`jit`]: the compilation unit ([`JitContext`]) owning generated code
//! - [`fold`]: three-valued constant folding pre-pass
//! - `emit`: IR generation with in-band null sentinels
//! - `passes`: load elimination, e-graph rewriting, CFG cleanup
//! - [`pipeline`]: emit, verify, optimize, finalize
//! - [`context`]: engine-facing [`CodegenContext`]
//! - [`fallback`]: [`ExecutablePredicate`], compiled or interpreted
//! - [`cache`]: [`PredicateCache`] keyed by schema and tree
//! - [`metrics`]: outcome counters

pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
mod emit;
pub mod error;
pub mod fallback;
pub mod fold;
pub mod jit;
pub mod metrics;
mod passes;
pub mod pipeline;

pub use backend::Backend;
pub use cache::{CacheSnapshot, PredicateCache};
pub use config::{CodegenConfig, VerifierPolicy};
pub use context::CodegenContext;
pub use error::{BackendError, CompileError, PredicateFn};
pub use fallback::ExecutablePredicate;
pub use fold::fold_constants;
pub use jit::JitContext;
pub use metrics::{CompilationMetrics, MetricsSnapshot};
pub use pipeline::{CompiledPredicate, PhaseTimings};
