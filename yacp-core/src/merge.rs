//! Settings merge
//!
//! Decides, per parameter, whether firmware sees its compiled default or
//! the active override. Called from the control loop, so nothing here
//! allocates, blocks or loops over more than one parameter unless asked
//! to patch a whole settings block.

use crate::codec::{merge_bytes, ByteOrder, CalScalar, CalValue, CodecError, VALUE_LEN};
use crate::error::CalError;
use crate::schema::Schema;
use crate::table::OverrideTable;

/// Effective value of parameter `index`
///
/// Returns `default` unless the parameter is overridden. Asking for an
/// index past the end, or with a default of the wrong type, is a caller
/// bug: it trips a debug assertion and otherwise yields `default`.
pub fn effective_value<const N: usize>(
    table: &OverrideTable<N>,
    index: usize,
    default: CalValue,
) -> CalValue {
    let Ok(record) = table.get(index) else {
        debug_assert!(false, "calibration index out of range");
        return default;
    };
    if !record.is_overridden() {
        return default;
    }
    if record.value.cal_type() != default.cal_type() {
        debug_assert!(false, "calibration read with the wrong type");
        return default;
    }
    record.value
}

/// Typed form of [`effective_value`]
pub fn effective<T: CalScalar, const N: usize>(
    table: &OverrideTable<N>,
    index: usize,
    default: T,
) -> T {
    T::from_value(effective_value(table, index, default.into_value())).unwrap_or(default)
}

/// Copy one wire-order value into a native-order settings block
///
/// `var_len` bytes of `buf` land at `var_start` in `dst`.
pub fn update_setting(
    dst: &mut [u8],
    var_start: usize,
    var_len: usize,
    buf: &[u8],
) -> Result<(), CodecError> {
    let end = var_start
        .checked_add(var_len)
        .ok_or(CodecError::InvalidLength(var_len))?;
    let target = dst
        .get_mut(var_start..end)
        .ok_or(CodecError::InvalidLength(var_len))?;
    merge_bytes(target, buf, var_len, ByteOrder::WIRE, ByteOrder::NATIVE)
}

/// Copy one native-order value out of a settings block into a wire slot
///
/// Counterpart of [`update_setting`]; bytes past `var_len` stay zero.
pub fn read_setting(
    src: &[u8],
    var_start: usize,
    var_len: usize,
) -> Result<[u8; VALUE_LEN], CodecError> {
    let end = var_start
        .checked_add(var_len)
        .ok_or(CodecError::InvalidLength(var_len))?;
    let source = src
        .get(var_start..end)
        .ok_or(CodecError::InvalidLength(var_len))?;
    let mut slot = [0u8; VALUE_LEN];
    merge_bytes(&mut slot, source, var_len, ByteOrder::NATIVE, ByteOrder::WIRE)?;
    Ok(slot)
}

/// Write every active override into a live settings block
///
/// Passthrough parameters are left untouched, so `settings` should start
/// out holding the compiled defaults. Returns how many parameters were
/// patched.
pub fn apply_overrides<const N: usize>(
    schema: &Schema<N>,
    table: &OverrideTable<N>,
    settings: &mut [u8],
) -> Result<usize, CalError> {
    if settings.len() < schema.settings_len() {
        return Err(CalError::InvalidLength(settings.len()));
    }

    let mut patched = 0;
    for (param, record) in schema.params.iter().zip(table.records().iter()) {
        if !record.is_overridden() {
            continue;
        }
        let slot: [u8; VALUE_LEN] = record.value.to_wire()?;
        update_setting(settings, param.offset as usize, param.len() as usize, &slot)?;
        patched += 1;
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CalType;
    use crate::table::{OverrideRecord, Status};

    const SCHEMA: Schema<3> = Schema::packed(1, [CalType::U8, CalType::U16, CalType::F32]);

    fn table_with_u16_override() -> OverrideTable<3> {
        let mut table = OverrideTable::new(&SCHEMA);
        table
            .set(1, OverrideRecord::overridden(CalValue::U16(0x1234)))
            .unwrap();
        table
    }

    #[test]
    fn test_passthrough_returns_default() {
        let table = table_with_u16_override();
        assert_eq!(effective(&table, 0, 7u8), 7);
        assert_eq!(effective(&table, 2, 1.5f32), 1.5);
    }

    #[test]
    fn test_override_returns_stored_value() {
        let table = table_with_u16_override();
        assert_eq!(effective(&table, 1, 0u16), 0x1234);
        assert_eq!(
            effective_value(&table, 1, CalValue::U16(0)),
            CalValue::U16(0x1234)
        );
    }

    #[test]
    fn test_disabled_override_returns_default() {
        let mut table = table_with_u16_override();
        table.set_status(1, Status::Passthrough).unwrap();
        assert_eq!(effective(&table, 1, 42u16), 42);
    }

    #[test]
    fn test_update_setting_native_order() {
        let mut settings = [0u8; 4];
        update_setting(&mut settings, 1, 2, &[0x34, 0x12, 0, 0]).unwrap();
        assert_eq!(u16::from_ne_bytes([settings[1], settings[2]]), 0x1234);
        assert_eq!(settings[0], 0);
        assert_eq!(settings[3], 0);
    }

    #[test]
    fn test_update_setting_out_of_bounds() {
        let mut settings = [0u8; 4];
        assert_eq!(
            update_setting(&mut settings, 2, 4, &[0; 4]),
            Err(CodecError::InvalidLength(4))
        );
        assert_eq!(
            update_setting(&mut settings, usize::MAX, 2, &[0; 4]),
            Err(CodecError::InvalidLength(2))
        );
    }

    #[test]
    fn test_update_setting_rejects_odd_width() {
        let mut settings = [0u8; 4];
        assert_eq!(
            update_setting(&mut settings, 0, 3, &[0; 4]),
            Err(CodecError::InvalidLength(3))
        );
        assert_eq!(settings, [0; 4]);
    }

    #[test]
    fn test_read_setting_wire_order() {
        let mut settings = [0u8; 6];
        settings[2..4].copy_from_slice(&0xBEEFu16.to_ne_bytes());
        assert_eq!(read_setting(&settings, 2, 2), Ok([0xEF, 0xBE, 0, 0]));
        assert_eq!(
            read_setting(&settings, 4, 4),
            Err(CodecError::InvalidLength(4))
        );
    }

    #[test]
    fn test_update_then_read_setting() {
        let mut settings = [0u8; 8];
        update_setting(&mut settings, 4, 4, &(-2i32).to_le_bytes()).unwrap();
        assert_eq!(read_setting(&settings, 4, 4), Ok((-2i32).to_le_bytes()));
    }

    #[test]
    fn test_apply_overrides_patches_only_overridden() {
        let mut table = table_with_u16_override();
        table
            .set(2, OverrideRecord::overridden(CalValue::F32(1.5)))
            .unwrap();
        table.set_status(2, Status::Passthrough).unwrap();

        let mut settings = [0xAAu8; 7];
        let patched = apply_overrides(&SCHEMA, &table, &mut settings).unwrap();
        assert_eq!(patched, 1);
        assert_eq!(settings[0], 0xAA);
        assert_eq!(u16::from_ne_bytes([settings[1], settings[2]]), 0x1234);
        assert_eq!(settings[3..], [0xAA; 4]);
    }

    #[test]
    fn test_apply_overrides_short_block() {
        let table = table_with_u16_override();
        let mut settings = [0u8; 6];
        assert_eq!(
            apply_overrides(&SCHEMA, &table, &mut settings),
            Err(CalError::InvalidLength(6))
        );
    }
}
