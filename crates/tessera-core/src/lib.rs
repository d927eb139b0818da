//! # Tessera Core
//!
//! Execution engine core for the Tessera embedded row store: the fixed tuple
//! format, statement parameters, predicate expression trees, the reference
//! interpreter and (behind the default `jit` feature) the Cranelift predicate
//! compiler.
//!
//! ```text
//!   planner ──► Expr + TupleSchema ──► CodegenContext::compile
//!                                          │
//!                    Some(CompiledPredicate)│None
//!                                          ▼
//!                         native fn(*const u8) -> i8   |   interpret::evaluate
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod expr;
pub mod interpret;
pub mod params;
pub mod tuple;
pub mod types;

#[cfg(feature = "jit")]
pub mod compiler;

pub use expr::{col, lit, null, param, CompareOp, ConjunctionKind, Expr};
pub use params::ParamSlots;
pub use tuple::{ColumnInfo, MutableTuple, Tuple, TupleLayout, TupleSchema};
pub use types::{LogicalType, TriBool, Value};
