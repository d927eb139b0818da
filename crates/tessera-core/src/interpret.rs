//! Tree-walking predicate evaluator.
//!
//! The reference semantics for [`Expr`]: every predicate the JIT compiler
//! declines runs here, and every predicate it accepts must produce the same
//! [`TriBool`] here for every tuple. Column reads go through [`Tuple`], which
//! uses the same [`TupleLayout`](crate::tuple::TupleLayout) offsets the
//! compiler bakes into generated loads.
//!
//! Integer comparisons widen both sides to `i64` before comparing, which is
//! what the compiler's sign extension does. `DOUBLE` comparisons are evaluated
//! here only.

use crate::expr::{CompareOp, ConjunctionKind, Expr};
use crate::params::ParamError;
use crate::tuple::{Tuple, TupleError};
use crate::types::{LogicalType, TriBool, Value};

/// Errors from interpreting a predicate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The expression uses an operator with no evaluator.
    #[error("unsupported expression: {0}")]
    Unsupported(String),
    /// A boolean operand evaluated to a non-boolean type.
    #[error("expected BOOLEAN operand, found {0}")]
    NotBoolean(LogicalType),
    /// Column access failed.
    #[error(transparent)]
    Tuple(#[from] TupleError),
    /// Parameter access failed.
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Evaluates a predicate against one tuple.
///
/// # Errors
///
/// Returns [`EvalError`] for `LIKE` / `IN`, non-boolean connective operands,
/// unknown columns or unknown parameter slots.
pub fn evaluate(expr: &Expr, tuple: &Tuple<'_>) -> Result<TriBool, EvalError> {
    let value = evaluate_value(expr, tuple)?;
    to_tribool(value)
}

/// Evaluates any expression node to a [`Value`].
///
/// # Errors
///
/// Same as [`evaluate`].
pub fn evaluate_value(expr: &Expr, tuple: &Tuple<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Column(c) => Ok(tuple.try_get(c.index)?),
        Expr::Param(p) => Ok(p.slots().get(p.index(), p.logical_type())?),
        Expr::Constant(v) => Ok(*v),
        Expr::IsNull(inner) => {
            let v = evaluate_value(inner, tuple)?;
            Ok(Value::Boolean(v.is_null()))
        }
        Expr::Not(inner) => {
            let v = to_tribool(evaluate_value(inner, tuple)?)?;
            Ok(v.not().into())
        }
        Expr::Conjunction { kind, left, right } => {
            let l = to_tribool(evaluate_value(left, tuple)?)?;
            let r = to_tribool(evaluate_value(right, tuple)?)?;
            let out = match kind {
                ConjunctionKind::And => l.and(r),
                ConjunctionKind::Or => l.or(r),
            };
            Ok(out.into())
        }
        Expr::Comparison { op, left, right } => {
            if matches!(op, CompareOp::Like | CompareOp::In) {
                return Err(EvalError::Unsupported(expr.to_string()));
            }
            let l = evaluate_value(left, tuple)?;
            let r = evaluate_value(right, tuple)?;
            Ok(compare(*op, l, r).into())
        }
    }
}

fn to_tribool(value: Value) -> Result<TriBool, EvalError> {
    match value {
        Value::Boolean(b) => Ok(b.into()),
        Value::Null(_) => Ok(TriBool::Unknown),
        other => Err(EvalError::NotBoolean(other.logical_type())),
    }
}

#[allow(clippy::cast_precision_loss)]
fn compare(op: CompareOp, left: Value, right: Value) -> TriBool {
    if left.is_null() || right.is_null() {
        return TriBool::Unknown;
    }
    let ord = match (left, right) {
        (Value::Double(l), Value::Double(r)) => l.partial_cmp(&r),
        (Value::Double(l), other) => other.as_i64().and_then(|r| l.partial_cmp(&(r as f64))),
        (other, Value::Double(r)) => other.as_i64().and_then(|l| (l as f64).partial_cmp(&r)),
        (l, r) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => None,
        },
    };
    // NaN: unordered compares unequal to everything.
    let ord_result = match ord {
        Some(ord) => op.test(ord),
        None => Some(op == CompareOp::Ne),
    };
    ord_result.map_or(TriBool::Unknown, TriBool::from)
}

/// Compares two constant values with the same rules as [`evaluate`].
///
/// Returns `None` for `LIKE` and `IN`.
pub(crate) fn compare_constants(op: CompareOp, left: Value, right: Value) -> Option<TriBool> {
    if matches!(op, CompareOp::Like | CompareOp::In) {
        return None;
    }
    Some(compare(op, left, right))
}
