//! Fixed parameter slots bound into compiled predicates by address.
//!
//! The planner allocates one [`ParamSlots`] array per statement. Each slot is
//! eight bytes at a stable heap address; a `ParamRef` records that address at
//! plan time, so generated code loads the parameter with a constant pointer
//! and no argument passing. Values are stored in the same native encoding as
//! tuple columns (narrow types occupy the slot's leading bytes, NULL is the
//! type's sentinel), so the compiler and the interpreter decode them
//! identically.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::tuple::{read_native, write_native};
use crate::types::{LogicalType, Value};

/// Errors from parameter slot access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// The slot index is outside the array.
    #[error("parameter slot {index} out of range for {count} slots")]
    SlotOutOfRange {
        /// The requested slot.
        index: usize,
        /// Number of slots.
        count: usize,
    },
}

/// A fixed-size array of statement parameters with stable slot addresses.
pub struct ParamSlots {
    slots: Box<[AtomicI64]>,
}

impl ParamSlots {
    /// Allocates `count` zeroed slots.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| AtomicI64::new(0)).collect(),
        }
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stores a value in its native encoding.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::SlotOutOfRange`] for an unknown slot.
    pub fn set(&self, index: usize, value: Value) -> Result<(), ParamError> {
        let slot = self.slot(index)?;
        let mut bytes = [0_u8; 8];
        write_native(&mut bytes, value.logical_type(), value);
        slot.store(i64::from_ne_bytes(bytes), Ordering::Relaxed);
        Ok(())
    }

    /// Reads a slot, decoding it as `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::SlotOutOfRange`] for an unknown slot.
    pub fn get(&self, index: usize, ty: LogicalType) -> Result<Value, ParamError> {
        let raw = self.slot(index)?.load(Ordering::Relaxed);
        Ok(read_native(&raw.to_ne_bytes(), ty, true))
    }

    /// Returns the address of a slot's first byte.
    ///
    /// The address stays valid for the lifetime of `self`.
    #[must_use]
    pub fn slot_address(&self, index: usize) -> Option<usize> {
        self.slots.get(index).map(|s| s.as_ptr() as usize)
    }

    fn slot(&self, index: usize) -> Result<&AtomicI64, ParamError> {
        self.slots.get(index).ok_or(ParamError::SlotOutOfRange {
            index,
            count: self.slots.len(),
        })
    }
}

impl fmt::Debug for ParamSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSlots")
            .field("len", &self.slots.len())
            .field("base", &self.slot_address(0))
            .finish()
    }
}
