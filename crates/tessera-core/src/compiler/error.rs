//! Error types for predicate compilation.
//!
//! [`CompileError`] separates constructs the compiler declines (the caller
//! falls back to the interpreter) from internal failures in verification or
//! code emission. [`BackendError`] covers the process-wide native backend.

use std::fmt;

use crate::types::{LogicalType, TypeError};

/// Errors that can occur while compiling a predicate.
#[derive(Debug)]
pub enum CompileError {
    /// An expression node or operator has no native lowering.
    UnsupportedExpr(String),
    /// A value type has no native lowering.
    UnsupportedType(LogicalType),
    /// A column reference is outside the tuple schema.
    ColumnOutOfRange {
        /// The referenced column.
        index: usize,
        /// Number of columns in the schema.
        count: usize,
    },
    /// A parameter reference is outside its slot array.
    ParamOutOfRange {
        /// The referenced slot.
        index: usize,
        /// Number of slots.
        count: usize,
    },
    /// Generated IR failed structural verification.
    Verification(String),
    /// The native backend is unavailable.
    Backend(BackendError),
    /// Cranelift code generation failed while optimizing.
    Codegen(Box<cranelift_codegen::CodegenError>),
    /// Cranelift module-level error while defining or linking.
    Cranelift(Box<cranelift_module::ModuleError>),
}

impl CompileError {
    /// Returns `true` if the predicate is well-formed but uses a construct the
    /// compiler does not lower. These are expected and handled by fallback.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedExpr(_)
                | Self::UnsupportedType(_)
                | Self::ColumnOutOfRange { .. }
                | Self::ParamOutOfRange { .. }
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedExpr(desc) => write!(f, "unsupported expression: {desc}"),
            Self::UnsupportedType(ty) => write!(f, "unsupported type: {ty}"),
            Self::ColumnOutOfRange { index, count } => {
                write!(f, "column {index} out of range for {count} columns")
            }
            Self::ParamOutOfRange { index, count } => {
                write!(f, "parameter {index} out of range for {count} slots")
            }
            Self::Verification(errors) => write!(f, "IR verification failed: {errors}"),
            Self::Backend(e) => write!(f, "backend error: {e}"),
            Self::Codegen(e) => write!(f, "codegen error: {e}"),
            Self::Cranelift(e) => write!(f, "cranelift error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(e) => Some(e),
            Self::Codegen(e) => Some(e.as_ref()),
            Self::Cranelift(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<cranelift_module::ModuleError> for CompileError {
    fn from(e: cranelift_module::ModuleError) -> Self {
        Self::Cranelift(Box::new(e))
    }
}

impl From<cranelift_codegen::CodegenError> for CompileError {
    fn from(e: cranelift_codegen::CodegenError) -> Self {
        Self::Codegen(Box::new(e))
    }
}

impl From<BackendError> for CompileError {
    fn from(e: BackendError) -> Self {
        Self::Backend(e)
    }
}

impl From<TypeError> for CompileError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::NotInteger(ty) => Self::UnsupportedType(ty),
            TypeError::UnsupportedWidth(bits) => {
                Self::UnsupportedExpr(format!("no native integer of {bits} bits"))
            }
        }
    }
}

/// Errors from the process-wide native code backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The host ISA could not be detected or configured.
    #[error("failed to initialize native backend: {0}")]
    Init(String),
    /// The global backend has been shut down.
    #[error("native backend has been shut down")]
    ShutDown,
    /// `shutdown` was called more than once.
    #[error("native backend already shut down")]
    AlreadyShutDown,
}

/// A compiled predicate: `fn(tuple_ptr: *const u8) -> i8`.
///
/// Returns [`BOOL_TRUE`](crate::types::BOOL_TRUE),
/// [`BOOL_FALSE`](crate::types::BOOL_FALSE) or
/// [`BOOL_NULL`](crate::types::BOOL_NULL). The caller must pass a pointer to a
/// tuple buffer at least as long as the schema the predicate was compiled for.
pub type PredicateFn = unsafe extern "C" fn(*const u8) -> i8;
