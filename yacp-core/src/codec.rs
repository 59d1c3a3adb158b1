//! Value codec
//!
//! Calibration values travel on the wire and in EEPROM as little-endian
//! bytes. [`merge_bytes`] is the one place where those bytes are reordered
//! into the running platform's native order; everything above it works on
//! typed [`CalValue`]s.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Width of the value slot in a record, frame or image
pub const VALUE_LEN: usize = 4;

/// Multi-byte ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Order used on the bus and in the persisted image
    pub const WIRE: Self = ByteOrder::Little;

    /// Order of the platform this build runs on
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = ByteOrder::Big;
}

/// Errors from the value codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Width is not 1, 2 or 4, or a buffer is shorter than the width
    InvalidLength(usize),
}

/// Copy `len` bytes of one scalar from `src` (in `from` order) to `dst`
/// (in `to` order)
///
/// Only scalar widths 1, 2 and 4 are accepted. Anything else, or a buffer
/// shorter than `len`, fails without touching `dst`.
pub fn merge_bytes(
    dst: &mut [u8],
    src: &[u8],
    len: usize,
    from: ByteOrder,
    to: ByteOrder,
) -> Result<(), CodecError> {
    if !matches!(len, 1 | 2 | 4) || dst.len() < len || src.len() < len {
        return Err(CodecError::InvalidLength(len));
    }

    let dst = &mut dst[..len];
    dst.copy_from_slice(&src[..len]);
    if from != to {
        dst.reverse();
    }
    Ok(())
}

/// Scalar type of a calibration parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CalType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl CalType {
    /// Size of the scalar in bytes
    pub const fn width(self) -> u8 {
        match self {
            CalType::U8 | CalType::I8 => 1,
            CalType::U16 | CalType::I16 => 2,
            CalType::U32 | CalType::I32 | CalType::F32 => 4,
        }
    }
}

/// A typed calibration value
///
/// Occupies one 4-byte slot on the wire; narrower types use the low bytes
/// and leave the rest zero.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CalValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
}

impl CalValue {
    /// Zero of the given type
    pub const fn zero(cal_type: CalType) -> Self {
        match cal_type {
            CalType::U8 => CalValue::U8(0),
            CalType::I8 => CalValue::I8(0),
            CalType::U16 => CalValue::U16(0),
            CalType::I16 => CalValue::I16(0),
            CalType::U32 => CalValue::U32(0),
            CalType::I32 => CalValue::I32(0),
            CalType::F32 => CalValue::F32(0.0),
        }
    }

    /// Type tag of this value
    pub const fn cal_type(&self) -> CalType {
        match self {
            CalValue::U8(_) => CalType::U8,
            CalValue::I8(_) => CalType::I8,
            CalValue::U16(_) => CalType::U16,
            CalValue::I16(_) => CalType::I16,
            CalValue::U32(_) => CalType::U32,
            CalValue::I32(_) => CalType::I32,
            CalValue::F32(_) => CalType::F32,
        }
    }

    /// Native-order bytes of the scalar, zero padded to the slot width
    pub fn to_native_bytes(&self) -> [u8; VALUE_LEN] {
        let mut out = [0u8; VALUE_LEN];
        match *self {
            CalValue::U8(v) => out[..1].copy_from_slice(&v.to_ne_bytes()),
            CalValue::I8(v) => out[..1].copy_from_slice(&v.to_ne_bytes()),
            CalValue::U16(v) => out[..2].copy_from_slice(&v.to_ne_bytes()),
            CalValue::I16(v) => out[..2].copy_from_slice(&v.to_ne_bytes()),
            CalValue::U32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            CalValue::I32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            CalValue::F32(v) => out.copy_from_slice(&v.to_ne_bytes()),
        }
        out
    }

    /// Rebuild a value from native-order bytes
    pub fn from_native_bytes(cal_type: CalType, bytes: &[u8; VALUE_LEN]) -> Self {
        let [b0, b1, b2, b3] = *bytes;
        match cal_type {
            CalType::U8 => CalValue::U8(b0),
            CalType::I8 => CalValue::I8(i8::from_ne_bytes([b0])),
            CalType::U16 => CalValue::U16(u16::from_ne_bytes([b0, b1])),
            CalType::I16 => CalValue::I16(i16::from_ne_bytes([b0, b1])),
            CalType::U32 => CalValue::U32(u32::from_ne_bytes([b0, b1, b2, b3])),
            CalType::I32 => CalValue::I32(i32::from_ne_bytes([b0, b1, b2, b3])),
            CalType::F32 => CalValue::F32(f32::from_ne_bytes([b0, b1, b2, b3])),
        }
    }

    /// Decode a value slot received in `order`
    pub fn decode(
        cal_type: CalType,
        slot: &[u8; VALUE_LEN],
        order: ByteOrder,
    ) -> Result<Self, CodecError> {
        let mut native = [0u8; VALUE_LEN];
        merge_bytes(
            &mut native,
            slot,
            cal_type.width() as usize,
            order,
            ByteOrder::NATIVE,
        )?;
        Ok(Self::from_native_bytes(cal_type, &native))
    }

    /// Encode into a value slot in `order`
    pub fn encode(&self, order: ByteOrder) -> Result<[u8; VALUE_LEN], CodecError> {
        let native = self.to_native_bytes();
        let mut slot = [0u8; VALUE_LEN];
        merge_bytes(
            &mut slot,
            &native,
            self.cal_type().width() as usize,
            ByteOrder::NATIVE,
            order,
        )?;
        Ok(slot)
    }

    /// Decode a little-endian wire slot
    pub fn from_wire(cal_type: CalType, slot: &[u8; VALUE_LEN]) -> Result<Self, CodecError> {
        Self::decode(cal_type, slot, ByteOrder::WIRE)
    }

    /// Encode into a little-endian wire slot
    pub fn to_wire(&self) -> Result<[u8; VALUE_LEN], CodecError> {
        self.encode(ByteOrder::WIRE)
    }

    /// Bitwise equality, so NaN overrides compare equal to themselves
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.cal_type() == other.cal_type() && self.to_native_bytes() == other.to_native_bytes()
    }
}

/// Rust scalar types a calibration can be read as
pub trait CalScalar: Copy {
    /// Parameter type this scalar corresponds to
    const TYPE: CalType;

    /// Extract from a value of the matching type
    fn from_value(value: CalValue) -> Option<Self>;

    /// Wrap into a value
    fn into_value(self) -> CalValue;
}

macro_rules! impl_cal_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl CalScalar for $ty {
                const TYPE: CalType = CalType::$variant;

                fn from_value(value: CalValue) -> Option<Self> {
                    match value {
                        CalValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_value(self) -> CalValue {
                    CalValue::$variant(self)
                }
            }

            impl From<$ty> for CalValue {
                fn from(v: $ty) -> Self {
                    CalValue::$variant(v)
                }
            }
        )*
    };
}

impl_cal_scalar! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_same_order_copies() {
        let mut dst = [0u8; 4];
        merge_bytes(&mut dst, &[1, 2, 3, 4], 4, ByteOrder::Little, ByteOrder::Little).unwrap();
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn test_merge_swaps_across_orders() {
        let mut dst = [0u8; 4];
        merge_bytes(&mut dst, &[0x34, 0x12], 2, ByteOrder::Little, ByteOrder::Big).unwrap();
        assert_eq!(dst, [0x12, 0x34, 0, 0]);

        merge_bytes(&mut dst, &[1, 2, 3, 4], 4, ByteOrder::Big, ByteOrder::Little).unwrap();
        assert_eq!(dst, [4, 3, 2, 1]);
    }

    #[test]
    fn test_merge_single_byte_ignores_order() {
        let mut dst = [0u8; 1];
        merge_bytes(&mut dst, &[0xAB], 1, ByteOrder::Little, ByteOrder::Big).unwrap();
        assert_eq!(dst, [0xAB]);
    }

    #[test]
    fn test_merge_rejects_unsupported_widths() {
        let mut dst = [0xEEu8; 8];
        for len in [0, 3, 5, 8] {
            assert_eq!(
                merge_bytes(&mut dst, &[0; 8], len, ByteOrder::Little, ByteOrder::Big),
                Err(CodecError::InvalidLength(len))
            );
        }
        assert_eq!(dst, [0xEE; 8]);
    }

    #[test]
    fn test_merge_rejects_short_buffers() {
        let mut dst = [0u8; 2];
        assert_eq!(
            merge_bytes(&mut dst, &[0; 4], 4, ByteOrder::Little, ByteOrder::Little),
            Err(CodecError::InvalidLength(4))
        );
    }

    #[test]
    fn test_wire_encoding_is_little_endian() {
        assert_eq!(CalValue::U16(0x1234).to_wire(), Ok([0x34, 0x12, 0, 0]));
        assert_eq!(CalValue::I8(-1).to_wire(), Ok([0xFF, 0, 0, 0]));
        assert_eq!(CalValue::F32(1.5).to_wire(), Ok([0, 0, 0xC0, 0x3F]));
    }

    #[test]
    fn test_wire_decoding_ignores_padding() {
        let value = CalValue::from_wire(CalType::U8, &[7, 0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(value, CalValue::U8(7));
    }

    #[test]
    fn test_big_endian_slot() {
        let slot = CalValue::U32(0x0102_0304).encode(ByteOrder::Big).unwrap();
        assert_eq!(slot, [1, 2, 3, 4]);
        let back = CalValue::decode(CalType::U32, &slot, ByteOrder::Big).unwrap();
        assert_eq!(back, CalValue::U32(0x0102_0304));
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(u16::from_value(CalValue::U16(5)), Some(5));
        assert_eq!(u16::from_value(CalValue::I16(5)), None);
        assert_eq!(1.5f32.into_value(), CalValue::F32(1.5));
        assert_eq!(<i32 as CalScalar>::TYPE, CalType::I32);
    }

    #[test]
    fn test_bits_eq_handles_nan() {
        let nan = CalValue::F32(f32::NAN);
        assert!(nan.bits_eq(&nan));
        assert!(!CalValue::U8(1).bits_eq(&CalValue::I8(1)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_value() -> impl Strategy<Value = CalValue> {
        prop_oneof![
            any::<u8>().prop_map(CalValue::U8),
            any::<i8>().prop_map(CalValue::I8),
            any::<u16>().prop_map(CalValue::U16),
            any::<i16>().prop_map(CalValue::I16),
            any::<u32>().prop_map(CalValue::U32),
            any::<i32>().prop_map(CalValue::I32),
            any::<f32>().prop_map(CalValue::F32),
        ]
    }

    proptest! {
        #[test]
        fn wire_slot_matches_le_bytes(v in any::<u32>()) {
            prop_assert_eq!(CalValue::U32(v).to_wire().unwrap(), v.to_le_bytes());
        }

        #[test]
        fn padding_beyond_width_is_zero(value in any_value()) {
            let width = value.cal_type().width() as usize;
            let slot = value.to_wire().unwrap();
            prop_assert!(slot[width..].iter().all(|&b| b == 0));
            let back = CalValue::from_wire(value.cal_type(), &slot).unwrap();
            prop_assert!(back.bits_eq(&value));
        }

        #[test]
        fn merge_twice_across_orders_is_identity(bytes in any::<[u8; 4]>(), pick in 0usize..3) {
            let len = [1, 2, 4][pick];
            let mut swapped = [0u8; 4];
            let mut back = [0u8; 4];
            merge_bytes(&mut swapped, &bytes, len, ByteOrder::Little, ByteOrder::Big).unwrap();
            merge_bytes(&mut back, &swapped, len, ByteOrder::Big, ByteOrder::Little).unwrap();
            prop_assert_eq!(&back[..len], &bytes[..len]);
        }
    }
}
