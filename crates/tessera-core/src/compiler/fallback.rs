//! Compiled-or-interpreted predicates.
//!
//! [`ExecutablePredicate`] is what the engine stores in a plan: either the
//! native function produced by [`CodegenContext`], or the original tree plus
//! the reason it could not be compiled. [`ExecutablePredicate::evaluate`]
//! hides the difference; both arms return the same [`TriBool`] for every
//! tuple.

use super::context::CodegenContext;
use super::error::CompileError;
use super::pipeline::CompiledPredicate;
use crate::expr::Expr;
use crate::interpret::{self, EvalError};
use crate::tuple::{Tuple, TupleSchema};
use crate::types::TriBool;

/// A predicate that is either compiled to native code or interpreted.
#[derive(Debug)]
pub enum ExecutablePredicate<'ctx> {
    /// Successfully compiled to native code.
    Compiled(CompiledPredicate<'ctx>),
    /// Compilation failed; evaluated by [`interpret::evaluate`].
    Interpreted {
        /// The predicate tree.
        expr: Expr,
        /// Why compilation failed.
        reason: CompileError,
    },
}

impl<'ctx> ExecutablePredicate<'ctx> {
    /// Compiles `expr`, falling back to interpretation on any compile error.
    ///
    /// # Panics
    ///
    /// Panics on a verification failure under
    /// [`VerifierPolicy::Panic`](super::VerifierPolicy::Panic).
    pub fn try_compile(ctx: &'ctx CodegenContext, schema: &TupleSchema, expr: &Expr) -> Self {
        match ctx.try_compile(schema, expr) {
            Ok(compiled) => Self::Compiled(compiled),
            Err(reason) => Self::Interpreted {
                expr: expr.clone(),
                reason,
            },
        }
    }

    /// Returns `true` if the predicate runs as native code.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        matches!(self, Self::Compiled(_))
    }

    /// Returns the compiled predicate if available.
    #[must_use]
    pub fn as_compiled(&self) -> Option<&CompiledPredicate<'ctx>> {
        match self {
            Self::Compiled(c) => Some(c),
            Self::Interpreted { .. } => None,
        }
    }

    /// Returns why compilation failed, if it did.
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&CompileError> {
        match self {
            Self::Compiled(_) => None,
            Self::Interpreted { reason, .. } => Some(reason),
        }
    }

    /// Evaluates the predicate against one tuple.
    ///
    /// # Errors
    ///
    /// Only the interpreted arm can fail; see [`interpret::evaluate`].
    ///
    /// # Panics
    ///
    /// The compiled arm panics if `tuple` is shorter than the layout it was
    /// compiled for.
    pub fn evaluate(&self, tuple: &Tuple<'_>) -> Result<TriBool, EvalError> {
        match self {
            Self::Compiled(c) => Ok(c.evaluate(tuple)),
            Self::Interpreted { expr, .. } => interpret::evaluate(expr, tuple),
        }
    }
}
