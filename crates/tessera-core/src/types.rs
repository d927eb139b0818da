//! Logical column types, their native representations, and null sentinels.
//!
//! Every nullable value is stored in-band: each integer width reserves its
//! minimum signed value as the SQL NULL bit pattern. The storage engine, the
//! interpreter and generated code all read the same bytes, so these constants
//! are the contract between them.
//!
//! | logical type | native        | null sentinel        |
//! |--------------|---------------|----------------------|
//! | `TinyInt`    | `i8`          | `i8::MIN`            |
//! | `SmallInt`   | `i16`         | `i16::MIN`           |
//! | `Integer`    | `i32`         | `i32::MIN`           |
//! | `BigInt`     | `i64`         | `i64::MIN`           |
//! | `Timestamp`  | `i64` (µs)    | `i64::MIN`           |
//! | `Boolean`    | `i8` (0 / 1)  | `i8::MIN`            |
//! | `Double`     | `f64`         | [`DOUBLE_NULL`]      |

use std::fmt;

/// Raw encoding of boolean `false`.
pub const BOOL_FALSE: i8 = 0;

/// Raw encoding of boolean `true`.
pub const BOOL_TRUE: i8 = 1;

/// Raw encoding of a NULL boolean (the 8-bit null sentinel).
pub const BOOL_NULL: i8 = i8::MIN;

/// Null sentinel for `Double` columns.
pub const DOUBLE_NULL: f64 = f64::MIN;

/// Errors from mapping logical types onto native representations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// No integer null sentinel exists for this bit width.
    #[error("no integer null sentinel for {0}-bit values")]
    UnsupportedWidth(u32),
    /// The logical type has no integer representation.
    #[error("{0} has no integer representation")]
    NotInteger(LogicalType),
}

/// Column and expression types understood by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Signed 8-bit integer.
    TinyInt,
    /// Signed 16-bit integer.
    SmallInt,
    /// Signed 32-bit integer.
    Integer,
    /// Signed 64-bit integer.
    BigInt,
    /// Microseconds since the epoch, stored as a signed 64-bit integer.
    Timestamp,
    /// Three-valued boolean stored in one byte.
    Boolean,
    /// 64-bit IEEE float.
    Double,
}

impl LogicalType {
    /// Returns the number of bytes a value of this type occupies in a tuple.
    #[must_use]
    pub const fn byte_width(self) -> usize {
        match self {
            Self::TinyInt | Self::Boolean => 1,
            Self::SmallInt => 2,
            Self::Integer => 4,
            Self::BigInt | Self::Timestamp | Self::Double => 8,
        }
    }

    /// Returns the native machine representation of this type.
    #[must_use]
    pub const fn native_type(self) -> NativeType {
        #[allow(clippy::cast_possible_truncation)]
        let bits = (self.byte_width() * 8) as u32;
        NativeType {
            bits,
            is_integer: !matches!(self, Self::Double),
        }
    }

    /// Returns `true` for types represented as native integers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.native_type().is_integer
    }

    /// Returns the in-band null sentinel for an integer-represented type.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::NotInteger`] for [`LogicalType::Double`].
    pub fn null_sentinel(self) -> Result<i64, TypeError> {
        let native = self.native_type();
        if !native.is_integer {
            return Err(TypeError::NotInteger(self));
        }
        null_sentinel(native.bits)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Timestamp => "TIMESTAMP",
            Self::Boolean => "BOOLEAN",
            Self::Double => "DOUBLE",
        };
        f.write_str(name)
    }
}

/// Native machine representation of a logical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeType {
    /// Width in bits.
    pub bits: u32,
    /// `false` for floating-point representations.
    pub is_integer: bool,
}

/// Returns the bit pattern reserved for SQL NULL at the given integer width.
///
/// The sentinel is the minimum signed value of the width, sign-extended to
/// `i64`.
///
/// # Errors
///
/// Returns [`TypeError::UnsupportedWidth`] for widths other than 8, 16, 32
/// and 64.
pub fn null_sentinel(bits: u32) -> Result<i64, TypeError> {
    match bits {
        8 => Ok(i64::from(i8::MIN)),
        16 => Ok(i64::from(i16::MIN)),
        32 => Ok(i64::from(i32::MIN)),
        64 => Ok(i64::MIN),
        other => Err(TypeError::UnsupportedWidth(other)),
    }
}

/// A single SQL value, as produced by the interpreter or written into a tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// SQL NULL of the given type.
    Null(LogicalType),
    /// `TINYINT` value.
    TinyInt(i8),
    /// `SMALLINT` value.
    SmallInt(i16),
    /// `INTEGER` value.
    Integer(i32),
    /// `BIGINT` value.
    BigInt(i64),
    /// `TIMESTAMP` value in microseconds.
    Timestamp(i64),
    /// `BOOLEAN` value.
    Boolean(bool),
    /// `DOUBLE` value.
    Double(f64),
}

impl Value {
    /// Returns the logical type of this value.
    #[must_use]
    pub const fn logical_type(&self) -> LogicalType {
        match self {
            Self::Null(ty) => *ty,
            Self::TinyInt(_) => LogicalType::TinyInt,
            Self::SmallInt(_) => LogicalType::SmallInt,
            Self::Integer(_) => LogicalType::Integer,
            Self::BigInt(_) => LogicalType::BigInt,
            Self::Timestamp(_) => LogicalType::Timestamp,
            Self::Boolean(_) => LogicalType::Boolean,
            Self::Double(_) => LogicalType::Double,
        }
    }

    /// Returns `true` if this is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Returns the value widened to `i64`, or `None` for NULL and `Double`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::TinyInt(v) => Some(i64::from(v)),
            Self::SmallInt(v) => Some(i64::from(v)),
            Self::Integer(v) => Some(i64::from(v)),
            Self::BigInt(v) | Self::Timestamp(v) => Some(v),
            Self::Boolean(b) => Some(i64::from(b)),
            Self::Null(_) | Self::Double(_) => None,
        }
    }

    /// Returns the native integer encoding of this value, including the null
    /// sentinel for NULL.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::NotInteger`] for `Double` values and `Double` NULLs.
    pub fn to_native_int(&self) -> Result<i64, TypeError> {
        match self {
            Self::Null(ty) => ty.null_sentinel(),
            Self::Double(_) => Err(TypeError::NotInteger(LogicalType::Double)),
            other => Ok(other.as_i64().unwrap_or_default()),
        }
    }

    /// Decodes a native integer read from memory, mapping the null sentinel to NULL.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is [`LogicalType::Double`].
    #[must_use]
    pub fn from_native_int(ty: LogicalType, raw: i64) -> Self {
        assert!(ty.is_integer(), "from_native_int called with {ty}");
        if ty.null_sentinel() == Ok(raw) {
            return Self::Null(ty);
        }
        Self::from_native_int_not_null(ty, raw)
    }

    /// Decodes a native integer read from a NOT NULL column.
    ///
    /// The sentinel bit pattern is not special here; compiled predicates never
    /// test NOT NULL columns for it either.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is [`LogicalType::Double`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_native_int_not_null(ty: LogicalType, raw: i64) -> Self {
        assert!(ty.is_integer(), "from_native_int_not_null called with {ty}");
        match ty {
            LogicalType::TinyInt => Self::TinyInt(raw as i8),
            LogicalType::SmallInt => Self::SmallInt(raw as i16),
            LogicalType::Integer => Self::Integer(raw as i32),
            LogicalType::BigInt => Self::BigInt(raw),
            LogicalType::Timestamp => Self::Timestamp(raw),
            LogicalType::Boolean => Self::Boolean(raw != 0),
            LogicalType::Double => unreachable!(),
        }
    }

    /// Returns `true` for a non-NULL value whose encoding is its type's null
    /// sentinel. Such values cannot be stored.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_reserved(&self) -> bool {
        match self {
            Self::Null(_) | Self::Boolean(_) => false,
            Self::Double(v) => *v == DOUBLE_NULL,
            other => other.to_native_int().ok() == other.logical_type().null_sentinel().ok(),
        }
    }

    /// Decodes a native `f64`, mapping [`DOUBLE_NULL`] to NULL.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn from_native_f64(raw: f64) -> Self {
        if raw == DOUBLE_NULL {
            Self::Null(LogicalType::Double)
        } else {
            Self::Double(raw)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => f.write_str("NULL"),
            Self::TinyInt(v) => write!(f, "{v}"),
            Self::SmallInt(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::BigInt(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Double(v) => write!(f, "{v}"),
        }
    }
}

/// SQL three-valued boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriBool {
    /// Predicate is false.
    False,
    /// Predicate is true.
    True,
    /// Predicate is unknown (a NULL operand was involved).
    Unknown,
}

impl TriBool {
    /// Decodes the raw byte returned by a compiled predicate.
    ///
    /// Any value other than 0 or 1 is treated as unknown.
    #[must_use]
    pub fn from_raw(raw: i8) -> Self {
        match raw {
            BOOL_FALSE => Self::False,
            BOOL_TRUE => Self::True,
            _ => {
                debug_assert_eq!(raw, BOOL_NULL, "unexpected tri-state encoding");
                Self::Unknown
            }
        }
    }

    /// Returns the raw byte encoding.
    #[must_use]
    pub const fn to_raw(self) -> i8 {
        match self {
            Self::False => BOOL_FALSE,
            Self::True => BOOL_TRUE,
            Self::Unknown => BOOL_NULL,
        }
    }

    /// WHERE-clause semantics: only `True` admits the row.
    #[must_use]
    pub const fn passes(self) -> bool {
        matches!(self, Self::True)
    }

    /// Three-valued AND.
    #[must_use]
    pub const fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Unknown,
        }
    }

    /// Three-valued OR.
    #[must_use]
    pub const fn or(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Unknown,
        }
    }

    /// Three-valued NOT.
    #[must_use]
    pub const fn not(self) -> Self {
        match self {
            Self::False => Self::True,
            Self::True => Self::False,
            Self::Unknown => Self::Unknown,
        }
    }
}

impl From<bool> for TriBool {
    fn from(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }
}

impl From<TriBool> for Value {
    fn from(t: TriBool) -> Self {
        match t {
            TriBool::False => Self::Boolean(false),
            TriBool::True => Self::Boolean(true),
            TriBool::Unknown => Self::Null(LogicalType::Boolean),
        }
    }
}
