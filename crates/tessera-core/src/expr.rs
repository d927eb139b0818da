//! Predicate expression trees supplied by the planner.
//!
//! [`Expr`] is an immutable tree over a closed set of node kinds. The
//! interpreter and the JIT compiler both match on it exhaustively, so adding a
//! node kind is a compile error in every consumer until it is handled.
//!
//! Trees are built with the free functions [`col`], [`lit`], [`null`] and
//! [`param`] plus the combinator methods on [`Expr`]:
//!
//! ```
//! use tessera_core::expr::{col, lit};
//!
//! let pred = col(0).eq(col(1)).and(col(2).is_null());
//! assert_eq!(pred.to_string(), "(($0 = $1) AND ($2 IS NULL))");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::params::ParamSlots;
use crate::tuple::TupleSchema;
use crate::types::{LogicalType, Value};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
    /// `IN`
    In,
}

impl CompareOp {
    /// Applies an ordering comparison to an [`Ordering`](std::cmp::Ordering).
    ///
    /// Returns `None` for `LIKE` and `IN`, which are not ordering comparisons.
    #[must_use]
    pub fn test(self, ord: std::cmp::Ordering) -> Option<bool> {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Eq => Some(ord == Equal),
            Self::Ne => Some(ord != Equal),
            Self::Lt => Some(ord == Less),
            Self::Gt => Some(ord == Greater),
            Self::Le => Some(ord != Greater),
            Self::Ge => Some(ord != Less),
            Self::Like | Self::In => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::In => "IN",
        };
        f.write_str(s)
    }
}

/// Boolean connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConjunctionKind {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl fmt::Display for ConjunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

/// Reference to a tuple column by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Index into the tuple schema.
    pub index: usize,
}

/// Reference to a statement parameter slot.
///
/// Holds the slot array alive, so a compiled predicate that baked in the slot
/// address can keep it alive too.
#[derive(Clone)]
pub struct ParamRef {
    slots: Arc<ParamSlots>,
    index: usize,
    logical_type: LogicalType,
}

impl ParamRef {
    /// Creates a reference to slot `index` of `slots`, read as `logical_type`.
    #[must_use]
    pub fn new(slots: Arc<ParamSlots>, index: usize, logical_type: LogicalType) -> Self {
        Self {
            slots,
            index,
            logical_type,
        }
    }

    /// Returns the slot array.
    #[must_use]
    pub fn slots(&self) -> &Arc<ParamSlots> {
        &self.slots
    }

    /// Returns the slot index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the parameter's declared type.
    #[must_use]
    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    /// Returns the slot's fixed address, or `None` if the index is out of range.
    #[must_use]
    pub fn address(&self) -> Option<usize> {
        self.slots.slot_address(self.index)
    }
}

impl fmt::Debug for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Addresses, not current values: the Debug form keys the predicate cache.
        f.debug_struct("ParamRef")
            .field("index", &self.index)
            .field("logical_type", &self.logical_type)
            .field("address", &self.address())
            .finish()
    }
}

impl PartialEq for ParamRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
            && self.index == other.index
            && self.logical_type == other.logical_type
    }
}

/// A node in a predicate expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Binary comparison.
    Comparison {
        /// The operator.
        op: CompareOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `AND` / `OR`.
    Conjunction {
        /// The connective.
        kind: ConjunctionKind,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `operand IS NULL`.
    IsNull(Box<Expr>),
    /// `NOT operand`.
    Not(Box<Expr>),
    /// Tuple column.
    Column(ColumnRef),
    /// Statement parameter.
    Param(ParamRef),
    /// Literal value.
    Constant(Value),
}

/// Column reference.
#[must_use]
pub fn col(index: usize) -> Expr {
    Expr::Column(ColumnRef { index })
}

/// Literal value.
#[must_use]
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Constant(value.into())
}

/// Typed NULL literal.
#[must_use]
pub fn null(ty: LogicalType) -> Expr {
    Expr::Constant(Value::Null(ty))
}

/// Parameter reference.
#[must_use]
pub fn param(slots: &Arc<ParamSlots>, index: usize, ty: LogicalType) -> Expr {
    Expr::Param(ParamRef::new(Arc::clone(slots), index, ty))
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    fn compare(self, op: CompareOp, other: Expr) -> Expr {
        Expr::Comparison {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// `self = other`
    #[must_use]
    pub fn eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Eq, other)
    }

    /// `self <> other`
    #[must_use]
    pub fn not_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Ne, other)
    }

    /// `self < other`
    #[must_use]
    pub fn lt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Lt, other)
    }

    /// `self <= other`
    #[must_use]
    pub fn lt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Le, other)
    }

    /// `self > other`
    #[must_use]
    pub fn gt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Gt, other)
    }

    /// `self >= other`
    #[must_use]
    pub fn gt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Ge, other)
    }

    /// `self LIKE pattern`
    #[must_use]
    pub fn like(self, pattern: Expr) -> Expr {
        self.compare(CompareOp::Like, pattern)
    }

    /// `self IN list`
    #[must_use]
    pub fn in_list(self, list: Expr) -> Expr {
        self.compare(CompareOp::In, list)
    }

    /// `self AND other`
    #[must_use]
    pub fn and(self, other: Expr) -> Expr {
        Expr::Conjunction {
            kind: ConjunctionKind::And,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// `self OR other`
    #[must_use]
    pub fn or(self, other: Expr) -> Expr {
        Expr::Conjunction {
            kind: ConjunctionKind::Or,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// `self IS NULL`
    #[must_use]
    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    /// `self IS NOT NULL`
    #[must_use]
    pub fn is_not_null(self) -> Expr {
        Expr::Not(Box::new(Expr::IsNull(Box::new(self))))
    }

    /// Returns the type this node produces.
    ///
    /// Comparisons, connectives, `IS NULL` and `NOT` always produce
    /// `Boolean` regardless of their operands. Returns `None` for a column
    /// index outside `schema`.
    #[must_use]
    pub fn result_type(&self, schema: &TupleSchema) -> Option<LogicalType> {
        match self {
            Expr::Comparison { .. }
            | Expr::Conjunction { .. }
            | Expr::IsNull(_)
            | Expr::Not(_) => Some(LogicalType::Boolean),
            Expr::Column(c) => schema.column(c.index).map(|info| info.logical_type),
            Expr::Param(p) => Some(p.logical_type),
            Expr::Constant(v) => Some(v.logical_type()),
        }
    }

    /// Returns the distinct parameter slot arrays referenced by this tree.
    #[must_use]
    pub fn param_slots(&self) -> Vec<Arc<ParamSlots>> {
        let mut out: Vec<Arc<ParamSlots>> = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Param(p) = e {
                if !out.iter().any(|s| Arc::ptr_eq(s, &p.slots)) {
                    out.push(Arc::clone(&p.slots));
                }
            }
        });
        out
    }

    /// Returns the number of nodes in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.visit(&mut |_| n += 1);
        n
    }

    pub(crate) fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Comparison { left, right, .. } | Expr::Conjunction { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::IsNull(inner) | Expr::Not(inner) => inner.visit(f),
            Expr::Column(_) | Expr::Param(_) | Expr::Constant(_) => {}
        }
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Comparison { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Conjunction { kind, left, right } => write!(f, "({left} {kind} {right})"),
            Expr::IsNull(inner) => write!(f, "({inner} IS NULL)"),
            Expr::Not(inner) => write!(f, "(NOT {inner})"),
            Expr::Column(c) => write!(f, "${}", c.index),
            Expr::Param(p) => write!(f, "?{}", p.index),
            Expr::Constant(v) => write!(f, "{v}"),
        }
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_produce_expected_shape() {
        let e = col(0).gt(lit(10_i32));
        match e {
            Expr::Comparison { op, left, right } => {
                assert_eq!(op, CompareOp::Gt);
                assert_eq!(*left, col(0));
                assert_eq!(*right, Expr::Constant(Value::Integer(10)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn boolean_nodes_report_boolean() {
        let schema = TupleSchema::packed([(LogicalType::BigInt, true)]);
        assert_eq!(
            col(0).eq(lit(1_i64)).result_type(&schema),
            Some(LogicalType::Boolean)
        );
        assert_eq!(
            col(0).is_null().result_type(&schema),
            Some(LogicalType::Boolean)
        );
        assert_eq!(col(0).result_type(&schema), Some(LogicalType::BigInt));
        assert_eq!(col(5).result_type(&schema), None);
    }

    #[test]
    fn display_renders_sql_like_text() {
        let slots = Arc::new(ParamSlots::new(1));
        let e = (!col(0).lt_eq(param(&slots, 0, LogicalType::Integer))).or(null(LogicalType::Boolean));
        assert_eq!(e.to_string(), "((NOT ($0 <= ?0)) OR NULL)");
    }

    #[test]
    fn param_slots_are_deduplicated() {
        let a = Arc::new(ParamSlots::new(2));
        let b = Arc::new(ParamSlots::new(1));
        let e = param(&a, 0, LogicalType::Integer)
            .eq(param(&a, 1, LogicalType::Integer))
            .and(param(&b, 0, LogicalType::Integer).is_null());
        assert_eq!(e.param_slots().len(), 2);
        assert_eq!(e.node_count(), 6);
    }

    #[test]
    fn param_equality_is_by_slot_identity() {
        let a = Arc::new(ParamSlots::new(1));
        let b = Arc::new(ParamSlots::new(1));
        assert_eq!(
            param(&a, 0, LogicalType::Integer),
            param(&a, 0, LogicalType::Integer)
        );
        assert_ne!(
            param(&a, 0, LogicalType::Integer),
            param(&b, 0, LogicalType::Integer)
        );
    }

    #[test]
    fn compare_op_ordering() {
        use std::cmp::Ordering::{Equal, Greater, Less};
        assert_eq!(CompareOp::Le.test(Equal), Some(true));
        assert_eq!(CompareOp::Le.test(Greater), Some(false));
        assert_eq!(CompareOp::Ne.test(Less), Some(true));
        assert_eq!(CompareOp::Like.test(Equal), None);
    }
}
