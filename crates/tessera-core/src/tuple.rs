//! Fixed-layout tuple format shared by storage, the interpreter and compiled predicates.
//!
//! [`TupleSchema`] describes one row's binary layout and precomputes a
//! [`TupleLayout`]: the absolute byte offset of every column. Generated code
//! bakes these offsets into its loads, so every reader of tuple memory goes
//! through the same layout rather than repeating the arithmetic.
//!
//! # Memory Layout
//!
//! ```text
//! [header: 8 bytes][col 0][col 1]...[col n-1]
//! ```
//!
//! - **Header** (8 bytes): reserved for storage-engine bookkeeping; never read
//!   by predicates.
//! - **Columns**: native-endian values at `header + column.offset`, unaligned,
//!   NULL encoded in-band with the type's null sentinel (see [`crate::types`]).
//!   In a NOT NULL column the sentinel bit pattern is read as a plain value,
//!   and [`MutableTuple::set`] refuses to write it into any column.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use tessera_core::tuple::{MutableTuple, TupleSchema};
//! use tessera_core::types::{LogicalType, Value};
//!
//! let schema = TupleSchema::packed([
//!     (LogicalType::Integer, true),
//!     (LogicalType::BigInt, false),
//! ]);
//!
//! let arena = Bump::new();
//! let mut tuple = MutableTuple::new_in(&arena, &schema);
//! tuple.set(0, Value::Null(LogicalType::Integer)).unwrap();
//! tuple.set(1, Value::BigInt(7)).unwrap();
//!
//! let tuple = tuple.freeze();
//! assert!(tuple.is_null(0));
//! assert_eq!(tuple.get(1), Value::BigInt(7));
//! ```

use bumpalo::Bump;

use crate::types::{LogicalType, Value, DOUBLE_NULL};

/// Size of the tuple header in bytes.
pub const TUPLE_HEADER_SIZE: usize = 8;

/// Errors from tuple schema construction and tuple access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TupleError {
    /// A column starts before the previous column ends.
    #[error("column {column} at offset {offset} overlaps the previous column ending at {previous_end}")]
    Overlap {
        /// Index of the offending column.
        column: usize,
        /// Its declared offset.
        offset: u32,
        /// End offset of the preceding column.
        previous_end: u32,
    },
    /// A column index is outside the schema.
    #[error("column index {index} out of range for {count} columns")]
    ColumnOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of columns in the schema.
        count: usize,
    },
    /// A buffer is too short to hold a tuple of this schema.
    #[error("tuple buffer of {len} bytes is shorter than the {required}-byte layout")]
    TooShort {
        /// Actual buffer length.
        len: usize,
        /// Required length.
        required: usize,
    },
    /// A value of the wrong type was written to a column.
    #[error("column {column} is {expected}, got a {actual} value")]
    TypeMismatch {
        /// Column index.
        column: usize,
        /// Declared column type.
        expected: LogicalType,
        /// Type of the value written.
        actual: LogicalType,
    },
    /// NULL was written to a column declared NOT NULL.
    #[error("column {column} does not allow NULL")]
    NotNullable {
        /// Column index.
        column: usize,
    },
    /// A non-NULL value equal to its type's null sentinel was written.
    #[error("column {column} cannot store the {ty} null sentinel as a value")]
    ReservedValue {
        /// Column index.
        column: usize,
        /// Column type.
        ty: LogicalType,
    },
}

/// Per-column metadata as supplied by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnInfo {
    /// Byte offset of the column from the end of the tuple header.
    pub offset: u32,
    /// Whether the column may hold NULL.
    pub allow_null: bool,
    /// The column's logical type.
    pub logical_type: LogicalType,
}

impl ColumnInfo {
    /// Creates a column descriptor.
    #[must_use]
    pub const fn new(offset: u32, logical_type: LogicalType, allow_null: bool) -> Self {
        Self {
            offset,
            allow_null,
            logical_type,
        }
    }

    /// Returns the column's width in bytes.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.logical_type.byte_width()
    }
}

/// Absolute byte offsets for every column of a schema.
///
/// The single place tuple field addresses are computed. The compiler emits
/// `tuple_ptr + field_offset(i)` as a load displacement; the interpreter and
/// [`Tuple`] index slices with the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleLayout {
    field_offsets: Vec<usize>,
    tuple_length: usize,
}

impl TupleLayout {
    fn compute(columns: &[ColumnInfo]) -> Self {
        let field_offsets = columns
            .iter()
            .map(|c| TUPLE_HEADER_SIZE + c.offset as usize)
            .collect();
        let data_end = columns
            .iter()
            .map(|c| c.offset as usize + c.width())
            .max()
            .unwrap_or(0);
        Self {
            field_offsets,
            tuple_length: TUPLE_HEADER_SIZE + data_end,
        }
    }

    /// Returns the header size in bytes (always [`TUPLE_HEADER_SIZE`]).
    #[must_use]
    pub const fn header_size() -> usize {
        TUPLE_HEADER_SIZE
    }

    /// Returns the absolute byte offset of a column within a tuple buffer.
    #[must_use]
    pub fn field_offset(&self, column: usize) -> Option<usize> {
        self.field_offsets.get(column).copied()
    }

    /// Returns the minimum buffer length for a tuple (header + columns).
    #[must_use]
    pub fn tuple_length(&self) -> usize {
        self.tuple_length
    }
}

/// Ordered column metadata describing one tuple's binary layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleSchema {
    columns: Vec<ColumnInfo>,
    layout: TupleLayout,
}

impl TupleSchema {
    /// Creates a schema from explicit column descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError::Overlap`] if offsets are not monotonic and
    /// non-overlapping.
    pub fn new(columns: Vec<ColumnInfo>) -> Result<Self, TupleError> {
        let mut previous_end = 0_u32;
        for (i, column) in columns.iter().enumerate() {
            if column.offset < previous_end {
                return Err(TupleError::Overlap {
                    column: i,
                    offset: column.offset,
                    previous_end,
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            let width = column.width() as u32;
            previous_end = column.offset + width;
        }
        let layout = TupleLayout::compute(&columns);
        Ok(Self { columns, layout })
    }

    /// Creates a schema with columns packed back to back in declaration order.
    #[must_use]
    pub fn packed(columns: impl IntoIterator<Item = (LogicalType, bool)>) -> Self {
        let mut offset = 0_u32;
        let columns: Vec<ColumnInfo> = columns
            .into_iter()
            .map(|(ty, allow_null)| {
                let info = ColumnInfo::new(offset, ty, allow_null);
                #[allow(clippy::cast_possible_truncation)]
                let width = ty.byte_width() as u32;
                offset += width;
                info
            })
            .collect();
        let layout = TupleLayout::compute(&columns);
        Self { columns, layout }
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the descriptor for a column, or `None` if out of range.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&ColumnInfo> {
        self.columns.get(index)
    }

    /// Returns all column descriptors.
    #[must_use]
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Returns the precomputed layout.
    #[must_use]
    pub fn layout(&self) -> &TupleLayout {
        &self.layout
    }

    /// Returns the minimum tuple buffer length in bytes.
    #[must_use]
    pub fn tuple_length(&self) -> usize {
        self.layout.tuple_length()
    }

    fn checked(&self, index: usize) -> Result<(&ColumnInfo, usize), TupleError> {
        match (self.columns.get(index), self.layout.field_offset(index)) {
            (Some(column), Some(offset)) => Ok((column, offset)),
            _ => Err(TupleError::ColumnOutOfRange {
                index,
                count: self.columns.len(),
            }),
        }
    }
}

/// Read-only view over one tuple's bytes.
#[derive(Debug, Clone, Copy)]
pub struct Tuple<'a> {
    data: &'a [u8],
    schema: &'a TupleSchema,
}

impl<'a> Tuple<'a> {
    /// Wraps a byte buffer holding a tuple of the given schema.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError::TooShort`] if `data` cannot hold every column.
    pub fn new(data: &'a [u8], schema: &'a TupleSchema) -> Result<Self, TupleError> {
        if data.len() < schema.tuple_length() {
            return Err(TupleError::TooShort {
                len: data.len(),
                required: schema.tuple_length(),
            });
        }
        Ok(Self { data, schema })
    }

    /// Returns the underlying bytes.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the schema.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &'a TupleSchema {
        self.schema
    }

    /// Reads a column value.
    ///
    /// NOT NULL columns never decode to NULL: their bits are read as a plain
    /// value even if they match the null sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError::ColumnOutOfRange`] for an unknown column.
    pub fn try_get(&self, column: usize) -> Result<Value, TupleError> {
        let (info, offset) = self.schema.checked(column)?;
        Ok(read_native(&self.data[offset..], info.logical_type, info.allow_null))
    }

    /// Reads a column value.
    ///
    /// # Panics
    ///
    /// Panics if `column >= schema.column_count()`.
    #[inline]
    #[must_use]
    pub fn get(&self, column: usize) -> Value {
        match self.try_get(column) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns `true` if the column holds its null sentinel.
    ///
    /// # Panics
    ///
    /// Panics if `column >= schema.column_count()`.
    #[inline]
    #[must_use]
    pub fn is_null(&self, column: usize) -> bool {
        self.get(column).is_null()
    }
}

/// Arena-allocated, mutable writer for constructing a [`Tuple`].
#[derive(Debug)]
pub struct MutableTuple<'a> {
    data: &'a mut [u8],
    schema: &'a TupleSchema,
}

impl<'a> MutableTuple<'a> {
    /// Allocates a zeroed tuple from the given arena.
    pub fn new_in(arena: &'a Bump, schema: &'a TupleSchema) -> Self {
        let data: &'a mut [u8] = arena.alloc_slice_fill_default(schema.tuple_length());
        Self { data, schema }
    }

    /// Writes a column value, encoding NULL as the column's sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError`] if the column is unknown, the value's type does
    /// not match, NULL is written to a NOT NULL column, or the value is the
    /// type's reserved null sentinel.
    pub fn set(&mut self, column: usize, value: Value) -> Result<(), TupleError> {
        let (info, offset) = self.schema.checked(column)?;
        if value.logical_type() != info.logical_type {
            return Err(TupleError::TypeMismatch {
                column,
                expected: info.logical_type,
                actual: value.logical_type(),
            });
        }
        if value.is_null() && !info.allow_null {
            return Err(TupleError::NotNullable { column });
        }
        if value.is_reserved() {
            return Err(TupleError::ReservedValue {
                column,
                ty: info.logical_type,
            });
        }
        write_native(&mut self.data[offset..], info.logical_type, value);
        Ok(())
    }

    /// Writes NULL into a nullable column.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_null(&mut self, column: usize) -> Result<(), TupleError> {
        let (info, _) = self.schema.checked(column)?;
        self.set(column, Value::Null(info.logical_type))
    }

    /// Writes raw integer bits into a column, bypassing type and null checks.
    ///
    /// Used to plant arbitrary bit patterns (including sentinels in NOT NULL
    /// columns) the way a storage engine would.
    ///
    /// # Errors
    ///
    /// Returns [`TupleError::ColumnOutOfRange`] for an unknown column.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_raw(&mut self, column: usize, raw: i64) -> Result<(), TupleError> {
        let (info, offset) = self.schema.checked(column)?;
        let dst = &mut self.data[offset..];
        match info.width() {
            1 => dst[..1].copy_from_slice(&(raw as i8).to_ne_bytes()),
            2 => dst[..2].copy_from_slice(&(raw as i16).to_ne_bytes()),
            4 => dst[..4].copy_from_slice(&(raw as i32).to_ne_bytes()),
            _ => dst[..8].copy_from_slice(&raw.to_ne_bytes()),
        }
        Ok(())
    }

    /// Borrows the current state as a read-only [`Tuple`].
    #[must_use]
    pub fn as_tuple(&self) -> Tuple<'_> {
        Tuple {
            data: &*self.data,
            schema: self.schema,
        }
    }

    /// Consumes the writer, returning a [`Tuple`] with the arena lifetime.
    #[must_use]
    pub fn freeze(self) -> Tuple<'a> {
        let data: &'a [u8] = self.data;
        Tuple {
            data,
            schema: self.schema,
        }
    }
}

/// Decodes a native value of type `ty` from the start of `src`.
///
/// The null sentinel decodes to NULL only when `allow_null` is set.
pub(crate) fn read_native(src: &[u8], ty: LogicalType, allow_null: bool) -> Value {
    let raw = match ty.byte_width() {
        1 => i64::from(i8::from_ne_bytes([src[0]])),
        2 => i64::from(i16::from_ne_bytes([src[0], src[1]])),
        4 => i64::from(i32::from_ne_bytes([src[0], src[1], src[2], src[3]])),
        _ => {
            let mut bytes = [0_u8; 8];
            bytes.copy_from_slice(&src[..8]);
            if ty == LogicalType::Double {
                let v = f64::from_ne_bytes(bytes);
                return if allow_null {
                    Value::from_native_f64(v)
                } else {
                    Value::Double(v)
                };
            }
            i64::from_ne_bytes(bytes)
        }
    };
    if allow_null {
        Value::from_native_int(ty, raw)
    } else {
        Value::from_native_int_not_null(ty, raw)
    }
}

/// Encodes `value` as the native representation of `ty` at the start of `dst`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write_native(dst: &mut [u8], ty: LogicalType, value: Value) {
    if ty == LogicalType::Double {
        let v = match value {
            Value::Double(v) => v,
            _ => DOUBLE_NULL,
        };
        dst[..8].copy_from_slice(&v.to_ne_bytes());
        return;
    }
    let raw = value.to_native_int().unwrap_or_default();
    match ty.byte_width() {
        1 => dst[..1].copy_from_slice(&(raw as i8).to_ne_bytes()),
        2 => dst[..2].copy_from_slice(&(raw as i16).to_ne_bytes()),
        4 => dst[..4].copy_from_slice(&(raw as i32).to_ne_bytes()),
        _ => dst[..8].copy_from_slice(&raw.to_ne_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_offsets() {
        let schema = TupleSchema::packed([
            (LogicalType::TinyInt, false),
            (LogicalType::Integer, true),
            (LogicalType::BigInt, true),
            (LogicalType::Boolean, false),
        ]);
        let offsets: Vec<u32> = schema.columns().iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 1, 5, 13]);
        assert_eq!(schema.layout().field_offset(1), Some(9));
        assert_eq!(schema.tuple_length(), TUPLE_HEADER_SIZE + 14);
        assert_eq!(schema.layout().field_offset(4), None);
    }

    #[test]
    fn explicit_offsets_with_gaps() {
        let schema = TupleSchema::new(vec![
            ColumnInfo::new(0, LogicalType::Integer, true),
            ColumnInfo::new(8, LogicalType::SmallInt, false),
        ])
        .unwrap();
        assert_eq!(schema.layout().field_offset(1), Some(16));
        assert_eq!(schema.tuple_length(), 18);
    }

    #[test]
    fn overlapping_offsets_rejected() {
        let err = TupleSchema::new(vec![
            ColumnInfo::new(0, LogicalType::BigInt, false),
            ColumnInfo::new(4, LogicalType::Integer, false),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TupleError::Overlap {
                column: 1,
                offset: 4,
                previous_end: 8
            }
        );
    }

    #[test]
    fn empty_schema_is_header_only() {
        let schema = TupleSchema::packed(Vec::<(LogicalType, bool)>::new());
        assert_eq!(schema.column_count(), 0);
        assert_eq!(schema.tuple_length(), TUPLE_HEADER_SIZE);
    }

    #[test]
    fn write_and_read_every_type() {
        let schema = TupleSchema::packed([
            (LogicalType::TinyInt, false),
            (LogicalType::SmallInt, false),
            (LogicalType::Integer, false),
            (LogicalType::BigInt, false),
            (LogicalType::Timestamp, false),
            (LogicalType::Boolean, false),
            (LogicalType::Double, false),
        ]);
        let arena = Bump::new();
        let mut t = MutableTuple::new_in(&arena, &schema);
        let values = [
            Value::TinyInt(-7),
            Value::SmallInt(1234),
            Value::Integer(-99_999),
            Value::BigInt(1 << 40),
            Value::Timestamp(1_700_000_000_000_000),
            Value::Boolean(true),
            Value::Double(2.5),
        ];
        for (i, v) in values.iter().enumerate() {
            t.set(i, *v).unwrap();
        }
        let t = t.freeze();
        for (i, v) in values.iter().enumerate() {
            assert_eq!(t.get(i), *v);
        }
    }

    #[test]
    fn nulls_are_sentinels_in_memory() {
        let schema = TupleSchema::packed([(LogicalType::Integer, true), (LogicalType::Double, true)]);
        let arena = Bump::new();
        let mut t = MutableTuple::new_in(&arena, &schema);
        t.set_null(0).unwrap();
        t.set_null(1).unwrap();
        let t = t.freeze();
        assert!(t.is_null(0));
        assert!(t.is_null(1));
        let start = schema.layout().field_offset(0).unwrap();
        assert_eq!(&t.data()[start..start + 4], &i32::MIN.to_ne_bytes());
    }

    #[test]
    fn null_into_not_null_column_rejected() {
        let schema = TupleSchema::packed([(LogicalType::Integer, false)]);
        let arena = Bump::new();
        let mut t = MutableTuple::new_in(&arena, &schema);
        assert_eq!(t.set_null(0), Err(TupleError::NotNullable { column: 0 }));
    }

    #[test]
    fn type_mismatch_rejected() {
        let schema = TupleSchema::packed([(LogicalType::Integer, false)]);
        let arena = Bump::new();
        let mut t = MutableTuple::new_in(&arena, &schema);
        assert!(matches!(
            t.set(0, Value::BigInt(1)),
            Err(TupleError::TypeMismatch { column: 0, .. })
        ));
    }

    #[test]
    fn sentinel_value_rejected() {
        let schema = TupleSchema::packed([(LogicalType::SmallInt, false), (LogicalType::Double, true)]);
        let arena = Bump::new();
        let mut t = MutableTuple::new_in(&arena, &schema);
        assert_eq!(
            t.set(0, Value::SmallInt(i16::MIN)),
            Err(TupleError::ReservedValue {
                column: 0,
                ty: LogicalType::SmallInt
            })
        );
        assert!(matches!(
            t.set(1, Value::Double(f64::MIN)),
            Err(TupleError::ReservedValue { column: 1, .. })
        ));
        t.set(0, Value::SmallInt(i16::MIN + 1)).unwrap();
    }

    #[test]
    fn sentinel_bits_in_not_null_column_read_as_value() {
        let schema = TupleSchema::packed([(LogicalType::SmallInt, false), (LogicalType::SmallInt, true)]);
        let arena = Bump::new();
        let mut t = MutableTuple::new_in(&arena, &schema);
        t.set_raw(0, i64::from(i16::MIN)).unwrap();
        t.set_raw(1, i64::from(i16::MIN)).unwrap();
        let t = t.freeze();
        assert!(!t.is_null(0));
        assert_eq!(t.get(0), Value::SmallInt(i16::MIN));
        assert!(t.is_null(1));
    }

    #[test]
    fn short_buffer_rejected() {
        let schema = TupleSchema::packed([(LogicalType::BigInt, false)]);
        let buf = [0_u8; 10];
        assert_eq!(
            Tuple::new(&buf, &schema).unwrap_err(),
            TupleError::TooShort {
                len: 10,
                required: 16
            }
        );
    }

    #[test]
    fn out_of_range_read() {
        let schema = TupleSchema::packed([(LogicalType::BigInt, false)]);
        let buf = [0_u8; 16];
        let t = Tuple::new(&buf, &schema).unwrap();
        assert_eq!(
            t.try_get(3),
            Err(TupleError::ColumnOutOfRange { index: 3, count: 1 })
        );
    }
}
