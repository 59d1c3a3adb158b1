//! Calibration parameter layout
//!
//! The firmware build generates one [`Schema`] describing every
//! calibratable parameter: its type and where it lives in the live
//! settings block. The engine only ever reads it.

use crate::codec::CalType;

/// Largest parameter count the one-byte wire index can address, keeping
/// one-past-the-end representable
pub const MAX_PARAMS: usize = 255;

/// Location and type of one calibration parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParamDescriptor {
    /// Byte offset within the settings block
    pub offset: u16,
    /// Scalar type, which also fixes the length
    pub cal_type: CalType,
}

impl ParamDescriptor {
    pub const fn new(offset: u16, cal_type: CalType) -> Self {
        Self { offset, cal_type }
    }

    /// Length in bytes within the settings block
    pub const fn len(&self) -> u8 {
        self.cal_type.width()
    }

    /// One past the last byte within the settings block
    pub const fn end(&self) -> usize {
        self.offset as usize + self.len() as usize
    }
}

/// The compiled calibration layout
///
/// `version` identifies the layout. Any change to the parameter list must
/// bump it, which invalidates previously persisted override images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Schema<const N: usize> {
    pub version: u16,
    pub params: [ParamDescriptor; N],
}

impl<const N: usize> Schema<N> {
    /// Build from explicit descriptors
    pub const fn new(version: u16, params: [ParamDescriptor; N]) -> Self {
        assert!(N <= MAX_PARAMS, "parameter index must fit in one byte");
        Self { version, params }
    }

    /// Lay parameters out back to back, in order, from offset zero
    pub const fn packed(version: u16, types: [CalType; N]) -> Self {
        let mut params = [ParamDescriptor::new(0, CalType::U8); N];
        let mut offset: u16 = 0;
        let mut i = 0;
        while i < N {
            params[i] = ParamDescriptor::new(offset, types[i]);
            offset += types[i].width() as u16;
            i += 1;
        }
        Self::new(version, params)
    }

    /// Number of parameters
    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Descriptor for `index`, if it exists
    pub fn get(&self, index: usize) -> Option<&ParamDescriptor> {
        self.params.get(index)
    }

    /// Bytes needed to hold every parameter of the settings block
    pub fn settings_len(&self) -> usize {
        self.params.iter().map(ParamDescriptor::end).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: Schema<3> = Schema::packed(4, [CalType::U8, CalType::U16, CalType::F32]);

    #[test]
    fn test_packed_offsets() {
        assert_eq!(SCHEMA.params[0].offset, 0);
        assert_eq!(SCHEMA.params[1].offset, 1);
        assert_eq!(SCHEMA.params[2].offset, 3);
        assert_eq!(SCHEMA.settings_len(), 7);
        assert_eq!(SCHEMA.version, 4);
    }

    #[test]
    fn test_descriptor_len() {
        assert_eq!(SCHEMA.params[1].len(), 2);
        assert_eq!(SCHEMA.params[2].end(), 7);
    }

    #[test]
    fn test_get_out_of_range() {
        assert!(SCHEMA.get(2).is_some());
        assert!(SCHEMA.get(3).is_none());
    }

    #[test]
    fn test_explicit_layout_with_gaps() {
        let schema = Schema::new(
            1,
            [
                ParamDescriptor::new(8, CalType::I32),
                ParamDescriptor::new(0, CalType::U16),
            ],
        );
        assert_eq!(schema.settings_len(), 12);
    }

    #[test]
    fn test_empty_schema() {
        let schema: Schema<0> = Schema::packed(1, []);
        assert!(schema.is_empty());
        assert_eq!(schema.settings_len(), 0);
    }
}
