//! Constant folding pre-pass for predicate compilation.
//!
//! [`fold_constants`] rewrites a predicate tree before code generation,
//! evaluating literal-only subtrees and applying three-valued boolean
//! identities. Folding uses the interpreter's comparison rules, so a folded
//! predicate returns the same [`TriBool`] as the original for every tuple.

use crate::expr::{CompareOp, ConjunctionKind, Expr};
use crate::interpret::compare_constants;
use crate::tuple::TupleSchema;
use crate::types::{LogicalType, TriBool, Value};

/// Folds constant sub-expressions in a predicate tree.
///
/// Handles:
/// - Comparisons of two literals (`1 < 2` → `TRUE`, `NULL = 1` → `NULL`)
/// - `IS NULL` of a literal, or of a column declared NOT NULL (→ `FALSE`)
/// - `NOT` of a literal
/// - Boolean identities that hold under three-valued logic: `TRUE AND x` →
///   `x`, `FALSE AND x` → `FALSE`, `TRUE OR x` → `TRUE`, `FALSE OR x` → `x`
///
/// Identities only fire when `x` is boolean-typed, so an ill-typed
/// predicate is left for the interpreter to reject. The absorbing forms
/// (`FALSE AND x`, `TRUE OR x`) also leave `x` in place when it contains
/// `LIKE` or `IN`, so such a predicate still falls back to interpretation.
///
/// Returns a (possibly simplified) clone of the input expression.
#[must_use]
pub fn fold_constants(schema: &TupleSchema, expr: &Expr) -> Expr {
    match expr {
        Expr::Comparison { op, left, right } => {
            let left = fold_constants(schema, left);
            let right = fold_constants(schema, right);
            if let (Expr::Constant(l), Expr::Constant(r)) = (&left, &right) {
                if let Some(result) = compare_constants(*op, *l, *r) {
                    return Expr::Constant(result.into());
                }
            }
            Expr::Comparison {
                op: *op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        Expr::Conjunction { kind, left, right } => {
            let left = fold_constants(schema, left);
            let right = fold_constants(schema, right);
            fold_conjunction(schema, *kind, left, right)
        }
        Expr::IsNull(inner) => {
            let inner = fold_constants(schema, inner);
            match &inner {
                Expr::Constant(v) => Expr::Constant(Value::Boolean(v.is_null())),
                Expr::Column(c) if schema.column(c.index).is_some_and(|i| !i.allow_null) => {
                    Expr::Constant(Value::Boolean(false))
                }
                _ => Expr::IsNull(Box::new(inner)),
            }
        }
        Expr::Not(inner) => {
            let inner = fold_constants(schema, inner);
            match truth_value(&inner) {
                Some(t) => Expr::Constant(t.not().into()),
                None => Expr::Not(Box::new(inner)),
            }
        }
        Expr::Column(_) | Expr::Param(_) | Expr::Constant(_) => expr.clone(),
    }
}

fn fold_conjunction(schema: &TupleSchema, kind: ConjunctionKind, left: Expr, right: Expr) -> Expr {
    match (truth_value(&left), truth_value(&right)) {
        (Some(l), Some(r)) => {
            let folded = match kind {
                ConjunctionKind::And => l.and(r),
                ConjunctionKind::Or => l.or(r),
            };
            return Expr::Constant(folded.into());
        }
        (Some(l), None) if is_boolean(schema, &right) => {
            if let Some(simplified) = identity(kind, l, &right) {
                return simplified;
            }
        }
        (None, Some(r)) if is_boolean(schema, &left) => {
            if let Some(simplified) = identity(kind, r, &left) {
                return simplified;
            }
        }
        _ => {}
    }
    Expr::Conjunction {
        kind,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Applies `constant <kind> other` identities. `NULL` never simplifies.
fn identity(kind: ConjunctionKind, constant: TriBool, other: &Expr) -> Option<Expr> {
    match (kind, constant) {
        (ConjunctionKind::And, TriBool::True) | (ConjunctionKind::Or, TriBool::False) => {
            Some(other.clone())
        }
        (ConjunctionKind::And, TriBool::False) | (ConjunctionKind::Or, TriBool::True) => {
            (!has_pattern_match(other)).then(|| Expr::Constant(constant.into()))
        }
        (_, TriBool::Unknown) => None,
    }
}

/// Returns the truth value of a boolean literal (NULL of any type is unknown).
fn truth_value(expr: &Expr) -> Option<TriBool> {
    match expr {
        Expr::Constant(Value::Boolean(b)) => Some(TriBool::from(*b)),
        Expr::Constant(Value::Null(LogicalType::Boolean)) => Some(TriBool::Unknown),
        _ => None,
    }
}

/// Returns whether `expr` has a `LIKE` or `IN` comparison anywhere.
fn has_pattern_match(expr: &Expr) -> bool {
    let mut found = false;
    expr.visit(&mut |e| {
        if let Expr::Comparison {
            op: CompareOp::Like | CompareOp::In,
            ..
        } = e
        {
            found = true;
        }
    });
    found
}

fn is_boolean(schema: &TupleSchema, expr: &Expr) -> bool {
    expr.result_type(schema) == Some(LogicalType::Boolean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit, null};

    fn schema() -> TupleSchema {
        TupleSchema::packed([
            (LogicalType::Integer, true),
            (LogicalType::Integer, false),
            (LogicalType::Boolean, true),
        ])
    }

    #[test]
    fn fold_literal_comparison() {
        let s = schema();
        assert_eq!(fold_constants(&s, &lit(1_i32).lt(lit(2_i64))), lit(true));
        assert_eq!(fold_constants(&s, &lit(3_i8).eq(lit(4_i8))), lit(false));
    }

    #[test]
    fn fold_null_comparison_is_null() {
        let s = schema();
        assert_eq!(
            fold_constants(&s, &null(LogicalType::Integer).eq(lit(1_i32))),
            null(LogicalType::Boolean)
        );
    }

    #[test]
    fn fold_is_null() {
        let s = schema();
        assert_eq!(fold_constants(&s, &null(LogicalType::BigInt).is_null()), lit(true));
        assert_eq!(fold_constants(&s, &lit(5_i32).is_null()), lit(false));
        assert_eq!(fold_constants(&s, &col(1).is_null()), lit(false));
        assert_eq!(fold_constants(&s, &col(0).is_null()), col(0).is_null());
    }

    #[test]
    fn fold_not() {
        let s = schema();
        assert_eq!(fold_constants(&s, &!lit(true)), lit(false));
        assert_eq!(
            fold_constants(&s, &!null(LogicalType::Boolean)),
            null(LogicalType::Boolean)
        );
    }

    #[test]
    fn fold_and_identities() {
        let s = schema();
        let x = col(0).eq(lit(1_i32));
        assert_eq!(fold_constants(&s, &lit(true).and(x.clone())), x);
        assert_eq!(fold_constants(&s, &x.clone().and(lit(false))), lit(false));
        // NULL AND x depends on x.
        let e = null(LogicalType::Boolean).and(x.clone());
        assert_eq!(fold_constants(&s, &e), e);
    }

    #[test]
    fn fold_or_identities() {
        let s = schema();
        let x = col(2);
        assert_eq!(fold_constants(&s, &lit(false).or(x.clone())), x);
        assert_eq!(fold_constants(&s, &x.clone().or(lit(true))), lit(true));
    }

    #[test]
    fn identities_skip_non_boolean_operands() {
        let s = schema();
        let e = lit(false).and(col(0));
        assert_eq!(fold_constants(&s, &e), e);
    }

    #[test]
    fn fold_three_valued_literals() {
        let s = schema();
        assert_eq!(
            fold_constants(&s, &null(LogicalType::Boolean).or(lit(true))),
            lit(true)
        );
        assert_eq!(
            fold_constants(&s, &null(LogicalType::Boolean).and(lit(true))),
            null(LogicalType::Boolean)
        );
    }

    #[test]
    fn fold_nested() {
        let s = schema();
        // (1 = 1) AND (col1 > 3) → col1 > 3
        let e = lit(1_i32).eq(lit(1_i32)).and(col(1).gt(lit(3_i32)));
        assert_eq!(fold_constants(&s, &e), col(1).gt(lit(3_i32)));
    }

    #[test]
    fn folding_is_idempotent() {
        let s = schema();
        let e = lit(true)
            .and(col(0).lt(lit(2_i32)))
            .or(!col(1).is_null().and(col(2)));
        let once = fold_constants(&s, &e);
        assert_eq!(fold_constants(&s, &once), once);
    }

    #[test]
    fn absorbing_identity_keeps_like_and_in() {
        let s = schema();
        let like = col(0).like(lit(1_i32));
        let e = lit(false).and(like.clone());
        assert_eq!(fold_constants(&s, &e), e);
        let e = col(0).eq(lit(2_i32)).and(col(1).in_list(lit(1_i32))).or(lit(true));
        assert_eq!(fold_constants(&s, &e), e);
        // The pass-through identity keeps the operand, so it still applies.
        assert_eq!(fold_constants(&s, &lit(true).and(like.clone())), like);
    }

    #[test]
    fn like_is_not_folded() {
        let s = schema();
        let e = lit(1_i32).like(lit(1_i32));
        assert_eq!(fold_constants(&s, &e), e);
    }
}
