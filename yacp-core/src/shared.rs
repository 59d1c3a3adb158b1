//! Shared engine state
//!
//! The dispatcher runs in the CAN receive context while the control loop
//! reads effective values, possibly from an interrupt or another task.
//! [`SharedCal`] puts [`CalState`] behind an embassy-sync blocking mutex
//! so every reader sees either the old or the new record, never a torn
//! one.
//!
//! Locks are short: a command is applied under the lock, but the EEPROM
//! write that follows works on a copy of the table taken inside it.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use yacp_hal::EepromStorage;
use yacp_protocol::{CanFrame, Response, StatusReport};

use crate::codec::{CalScalar, CalValue};
use crate::dispatch::Dispatcher;
use crate::error::CalError;
use crate::live::LiveData;
use crate::persist::{Diagnostics, LoadOutcome};
use crate::state::CalState;

/// [`CalState`] behind a blocking mutex
///
/// With `CriticalSectionRawMutex` it can live in a `static` and be used
/// from interrupt handlers.
pub struct SharedCal<'a, M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<CalState<'a, N>>>,
}

impl<'a, M: RawMutex, const N: usize> SharedCal<'a, M, N> {
    pub const fn new(state: CalState<'a, N>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(state)),
        }
    }

    /// Run `f` with exclusive access to the state
    ///
    /// # Panics
    ///
    /// Panics if `f` calls back into this `SharedCal`.
    pub fn lock<R>(&self, f: impl FnOnce(&mut CalState<'a, N>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// See [`CalState::init`]
    ///
    /// Runs before the bus is serviced, so the load happens under the lock.
    pub fn init<S: EepromStorage>(&self, storage: &mut S) -> Result<LoadOutcome, CalError> {
        self.lock(|state| state.init(storage))
    }

    /// Handle one received frame, returning the reply to send
    ///
    /// If the persist fails, the lock is taken again to put the previous
    /// record back.
    pub fn handle<S: EepromStorage, L: LiveData>(
        &self,
        dispatcher: &Dispatcher,
        storage: &mut S,
        live: &mut L,
        frame: &CanFrame,
    ) -> Option<Response> {
        let staged = self.lock(|state| -> Result<_, CalError> {
            let Some(cmd) = dispatcher.decode(frame)? else {
                return Ok(None);
            };
            let applied = dispatcher.apply(state, live, cmd)?;
            let snapshot = applied
                .persist
                .then(|| (*state.table(), state.persistence().clone(), state.schema()));
            Ok(Some((applied, snapshot)))
        });

        let result = staged.and_then(|staged| {
            let Some((applied, snapshot)) = staged else {
                return Ok(None);
            };
            if let Some((table, manager, schema)) = snapshot {
                if let Err(e) = manager.persist(storage, schema, &table) {
                    if let Some(undo) = applied.undo {
                        self.lock(|state| undo.restore(state))?;
                        warn!("Persist failed, override {} rolled back", undo.index);
                    }
                    return Err(e);
                }
            }
            if applied.save_settings {
                live.save_settings()?;
            }
            Ok(applied.response)
        });
        dispatcher.respond(frame, result)
    }

    /// See [`CalState::effective`]
    pub fn effective<T: CalScalar>(&self, index: usize, default: T) -> T {
        self.lock(|state| state.effective(index, default))
    }

    /// See [`CalState::effective_value`]
    pub fn effective_value(&self, index: usize, default: CalValue) -> CalValue {
        self.lock(|state| state.effective_value(index, default))
    }

    /// See [`CalState::apply_overrides`]
    pub fn apply_overrides(&self, settings: &mut [u8]) -> Result<usize, CalError> {
        self.lock(|state| state.apply_overrides(settings))
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.lock(|state| state.diagnostics())
    }

    pub fn clear_diagnostics(&self) {
        self.lock(|state| state.clear_diagnostics())
    }

    pub fn status_report(&self) -> StatusReport {
        self.lock(|state| state.status_report())
    }

    /// See [`CalState::reset_to_defaults`]
    ///
    /// Rare, operator-triggered, so it persists under the lock.
    pub fn reset_to_defaults<S: EepromStorage>(&self, storage: &mut S) -> Result<(), CalError> {
        self.lock(|state| state.reset_to_defaults(storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CalType;
    use crate::config::PersistConfig;
    use crate::live::LiveBlocks;
    use crate::schema::Schema;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use yacp_hal::RamEeprom;
    use yacp_protocol::{Command, CommandCodes, NackReason, YACP_COMMAND_ID};

    static SCHEMA: Schema<2> = Schema::packed(3, [CalType::I16, CalType::F32]);

    fn shared() -> SharedCal<'static, CriticalSectionRawMutex, 2> {
        SharedCal::new(CalState::new(&SCHEMA, PersistConfig::DEFAULT))
    }

    fn frame(cmd: Command) -> CanFrame {
        CanFrame::new(YACP_COMMAND_ID, cmd.encode(&CommandCodes::DEFAULT))
    }

    #[test]
    fn test_write_visible_to_readers() {
        let cal = shared();
        let mut eeprom = RamEeprom::<32>::new();
        cal.init(&mut eeprom).unwrap();
        let dispatcher = Dispatcher::default();

        assert_eq!(cal.effective(0, 100i16), 100);
        let write = frame(Command::Write {
            index: 0,
            value: [0xFB, 0xFF, 0, 0],
            width: 2,
        });
        assert!(cal.handle(&dispatcher, &mut eeprom, &mut (), &write).is_some());
        assert_eq!(cal.effective(0, 100i16), -5);
        assert_eq!(cal.effective_value(0, CalValue::I16(1)), CalValue::I16(-5));
    }

    #[test]
    fn test_persisted_snapshot_survives_power_cycle() {
        let cal = shared();
        let mut eeprom = RamEeprom::<32>::new();
        cal.init(&mut eeprom).unwrap();
        let dispatcher = Dispatcher::default();

        let write = frame(Command::Write {
            index: 1,
            value: 2.5f32.to_le_bytes(),
            width: 4,
        });
        cal.handle(&dispatcher, &mut eeprom, &mut (), &write).unwrap();
        eeprom.power_cycle();

        let reloaded = shared();
        assert_eq!(reloaded.init(&mut eeprom), Ok(LoadOutcome::Validated));
        assert_eq!(reloaded.effective(1, 0.0f32), 2.5);
    }

    #[test]
    fn test_rejected_frame_nacks() {
        let cal = shared();
        let mut eeprom = RamEeprom::<32>::new();
        cal.init(&mut eeprom).unwrap();
        let dispatcher = Dispatcher::default();

        let enable = frame(Command::EnableOverride { index: 2 });
        let response = cal.handle(&dispatcher, &mut eeprom, &mut (), &enable);
        assert!(matches!(
            response,
            Some(Response::Nack {
                reason: NackReason::IndexOutOfRange,
                index: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_foreign_frame_ignored() {
        let cal = shared();
        let mut eeprom = RamEeprom::<32>::new();
        let dispatcher = Dispatcher::default();
        assert_eq!(
            cal.handle(&dispatcher, &mut eeprom, &mut (), &CanFrame::new(0x200, [0; 8])),
            None
        );
    }

    #[test]
    fn test_diagnostics_and_reset() {
        let cal = shared();
        let mut eeprom = RamEeprom::<32>::new();
        cal.init(&mut eeprom).unwrap();
        assert!(cal.diagnostics().version_mismatch);
        assert!(cal.status_report().version_mismatch);

        cal.clear_diagnostics();
        assert!(!cal.diagnostics().any());

        let dispatcher = Dispatcher::default();
        cal.handle(&dispatcher, &mut eeprom, &mut (), &frame(Command::EnableOverride { index: 1 }))
            .unwrap();
        assert_eq!(cal.effective(1, 4.0f32), 0.0);

        cal.reset_to_defaults(&mut eeprom).unwrap();
        assert_eq!(cal.effective(1, 4.0f32), 4.0);
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let cal = shared();
        let mut eeprom = RamEeprom::<32>::new();
        cal.init(&mut eeprom).unwrap();
        let dispatcher = Dispatcher::default();

        let first = frame(Command::Write {
            index: 0,
            value: [0x10, 0, 0, 0],
            width: 2,
        });
        cal.handle(&dispatcher, &mut eeprom, &mut (), &first).unwrap();

        eeprom.set_fail_writes(true);
        let second = frame(Command::Write {
            index: 0,
            value: [0x20, 0, 0, 0],
            width: 2,
        });
        let response = cal.handle(&dispatcher, &mut eeprom, &mut (), &second);
        assert!(matches!(
            response,
            Some(Response::Nack {
                reason: NackReason::Storage,
                ..
            })
        ));
        assert_eq!(cal.effective(0, 0i16), 0x10);

        let disable = frame(Command::DisableOverride { index: 0 });
        cal.handle(&dispatcher, &mut eeprom, &mut (), &disable).unwrap();
        assert_eq!(cal.effective(0, 1i16), 0x10);
    }

    #[test]
    fn test_settings_update_through_shared_block() {
        let cal = shared();
        let mut eeprom = RamEeprom::<32>::new();
        cal.init(&mut eeprom).unwrap();
        let dispatcher = Dispatcher::default();
        let blocks: Mutex<CriticalSectionRawMutex, RefCell<LiveBlocks<4, 0>>> =
            Mutex::new(RefCell::new(LiveBlocks::new([0; 4], [])));

        let update = frame(Command::UpdateSetting {
            offset: 0,
            len: 2,
            value: [0x00, 0x01, 0, 0],
        });
        let response = cal.handle(&dispatcher, &mut eeprom, &mut &blocks, &update);
        assert!(matches!(response, Some(Response::Data { len: 2, .. })));

        let settings = blocks.lock(|cell| cell.borrow().settings);
        assert_eq!(u16::from_ne_bytes([settings[0], settings[1]]), 0x0100);
    }
}
