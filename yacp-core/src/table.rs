//! Override table
//!
//! One `{status, value}` record per compiled parameter, addressed by
//! parameter index. Records are always replaced whole, never field by
//! field, so a reader holding the table never sees a status from one write
//! paired with a value from another.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::codec::{CalType, CalValue, CodecError, VALUE_LEN};
use crate::schema::Schema;

/// Bytes per record in the persisted image: status then value slot
pub const RECORD_LEN: usize = 1 + VALUE_LEN;

/// Whether a parameter follows its compiled default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Status {
    /// Compiled default governs
    Passthrough = 0,
    /// Stored override value governs
    Overridden = 1,
}

impl Status {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Status::Passthrough),
            1 => Some(Status::Overridden),
            _ => None,
        }
    }
}

/// Errors from table access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TableError {
    /// Index is not below the compiled parameter count
    IndexOutOfRange(usize),
    /// Value type differs from the parameter's declared type
    TypeMismatch(usize),
}

/// Override state of one parameter
///
/// `value` is only meaningful while `status` is [`Status::Overridden`].
/// It is kept across a switch back to passthrough so re-enabling restores
/// the last override.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OverrideRecord {
    pub status: Status,
    pub value: CalValue,
}

impl OverrideRecord {
    /// Passthrough record with a zero value of the given type
    pub const fn passthrough(cal_type: CalType) -> Self {
        Self {
            status: Status::Passthrough,
            value: CalValue::zero(cal_type),
        }
    }

    /// Active override
    pub const fn overridden(value: CalValue) -> Self {
        Self {
            status: Status::Overridden,
            value,
        }
    }

    pub fn is_overridden(&self) -> bool {
        self.status == Status::Overridden
    }

    /// Persisted form: status byte then little-endian value slot
    pub fn to_bytes(&self) -> Result<[u8; RECORD_LEN], CodecError> {
        let slot = self.value.to_wire()?;
        Ok([self.status.as_u8(), slot[0], slot[1], slot[2], slot[3]])
    }

    /// Parse the persisted form
    ///
    /// Returns `Ok(None)` for an unknown status byte.
    pub fn from_bytes(
        cal_type: CalType,
        bytes: &[u8; RECORD_LEN],
    ) -> Result<Option<Self>, CodecError> {
        let Some(status) = Status::from_u8(bytes[0]) else {
            return Ok(None);
        };
        let value = CalValue::from_wire(cal_type, &[bytes[1], bytes[2], bytes[3], bytes[4]])?;
        Ok(Some(Self { status, value }))
    }
}

/// The working copy of every parameter's override state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideTable<const N: usize> {
    records: [OverrideRecord; N],
}

impl<const N: usize> OverrideTable<N> {
    /// All-passthrough table shaped after `schema`
    pub fn new(schema: &Schema<N>) -> Self {
        let mut records = [OverrideRecord::passthrough(CalType::U8); N];
        for (record, param) in records.iter_mut().zip(schema.params.iter()) {
            *record = OverrideRecord::passthrough(param.cal_type);
        }
        Self { records }
    }

    /// Number of records
    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Record for `index`
    pub fn get(&self, index: usize) -> Result<OverrideRecord, TableError> {
        self.records
            .get(index)
            .copied()
            .ok_or(TableError::IndexOutOfRange(index))
    }

    /// Replace the whole record for `index`
    ///
    /// The value must keep the parameter's type.
    pub fn set(&mut self, index: usize, record: OverrideRecord) -> Result<(), TableError> {
        let slot = self
            .records
            .get_mut(index)
            .ok_or(TableError::IndexOutOfRange(index))?;
        if slot.value.cal_type() != record.value.cal_type() {
            return Err(TableError::TypeMismatch(index));
        }
        *slot = record;
        Ok(())
    }

    /// Change only the status, keeping the stored value
    ///
    /// Idempotent. Switching to passthrough leaves the value in place.
    pub fn set_status(&mut self, index: usize, status: Status) -> Result<(), TableError> {
        let current = self.get(index)?;
        self.set(
            index,
            OverrideRecord {
                status,
                value: current.value,
            },
        )
    }

    /// Change only the value, keeping the status
    pub fn set_value(&mut self, index: usize, value: CalValue) -> Result<(), TableError> {
        let current = self.get(index)?;
        self.set(
            index,
            OverrideRecord {
                status: current.status,
                value,
            },
        )
    }

    /// Back to all-passthrough with zeroed values
    pub fn reset(&mut self, schema: &Schema<N>) {
        *self = Self::new(schema);
    }

    /// Every record, in parameter order
    pub fn records(&self) -> &[OverrideRecord; N] {
        &self.records
    }

    /// Number of parameters currently overridden
    pub fn overridden_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_overridden()).count()
    }

    /// True if every parameter follows its compiled default
    pub fn is_all_passthrough(&self) -> bool {
        self.overridden_count() == 0
    }
}
