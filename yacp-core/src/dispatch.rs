//! Command dispatcher
//!
//! Turns one received frame into at most one override table mutation, at
//! most one persist, and at most one reply. Every check happens before
//! the table is touched, so a rejected frame changes nothing. A mutation
//! whose persist fails is rolled back before the NACK goes out.

use yacp_hal::EepromStorage;
use yacp_protocol::{Addressing, CanFrame, Command, Response};

use crate::codec::{CalValue, VALUE_LEN};
use crate::config::{PersistMode, ProtocolConfig};
use crate::error::CalError;
use crate::live::{self, LiveData};
use crate::state::CalState;
use crate::table::{OverrideRecord, Status};

/// Record a mutation replaced, restored if the persist fails
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Undo {
    pub index: usize,
    pub previous: OverrideRecord,
}

impl Undo {
    /// Put the previous record back
    pub fn restore<const N: usize>(&self, state: &mut CalState<'_, N>) -> Result<(), CalError> {
        state.table_mut().set(self.index, self.previous)?;
        Ok(())
    }
}

/// Result of applying a command to the table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    /// Reply for the tool, sent once any persist has succeeded
    pub response: Option<Response>,
    /// The table must be written to storage before replying
    pub persist: bool,
    /// Set when the table changed
    pub undo: Option<Undo>,
    /// The live settings block must be saved before replying
    pub save_settings: bool,
}

impl Applied {
    fn reply(response: Response) -> Self {
        Self {
            response: Some(response),
            persist: false,
            undo: None,
            save_settings: false,
        }
    }
}

/// Decodes and applies calibration commands
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: ProtocolConfig,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(ProtocolConfig::DEFAULT)
    }
}

impl Dispatcher {
    pub const fn new(config: ProtocolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// True if `frame` arrived on the command identifier
    ///
    /// Anything else is ordinary bus traffic and is ignored.
    pub fn accepts(&self, frame: &CanFrame) -> bool {
        frame.id == self.config.command_id
    }

    /// Parse the command carried by `frame`
    ///
    /// Returns `Ok(None)` for frames meant for someone else: another
    /// identifier, or another device when device addressing is on. A
    /// status query sent to device 0 is a broadcast and always answered.
    pub fn decode(&self, frame: &CanFrame) -> Result<Option<Command>, CalError> {
        if !self.accepts(frame) {
            return Ok(None);
        }

        let codes = &self.config.codes;
        let (code, device) = self.config.addressing.split(frame.command_byte());
        if let (Some(device), Addressing::Device(own)) = (device, self.config.addressing) {
            let broadcast = device == 0 && code == codes.query_status;
            if device != own && !broadcast {
                return Ok(None);
            }
        }

        let mut data = frame.data;
        data[0] = code;
        Ok(Some(Command::decode(codes, &data)?))
    }

    /// Validate `cmd` and apply it to `state` or `live`
    ///
    /// Does not touch storage; [`Applied::persist`] and
    /// [`Applied::save_settings`] say what the caller must write before
    /// sending the reply, and [`Applied::undo`] what to put back if that
    /// fails.
    pub fn apply<L: LiveData, const N: usize>(
        &self,
        state: &mut CalState<'_, N>,
        live: &mut L,
        cmd: Command,
    ) -> Result<Applied, CalError> {
        let codes = &self.config.codes;
        let code = cmd.code(codes);

        let undo = match cmd.index() {
            Some(index) if cmd.is_mutating() => Some(Undo {
                index: index as usize,
                previous: state.record(index as usize)?,
            }),
            _ => None,
        };

        let index = match cmd {
            Command::Read { index } => {
                return Ok(Applied::reply(record_response(state, code, index)?));
            }
            Command::Write {
                index,
                value,
                width,
            } => {
                let value = self.write_value(state, index, &value, width)?;
                state
                    .table_mut()
                    .set(index as usize, OverrideRecord::overridden(value))?;
                index
            }
            Command::EnableOverride { index } => {
                state
                    .table_mut()
                    .set_status(index as usize, Status::Overridden)?;
                index
            }
            Command::DisableOverride { index } => {
                state
                    .table_mut()
                    .set_status(index as usize, Status::Passthrough)?;
                index
            }
            Command::Save => {
                return Ok(Applied {
                    response: Some(Response::Saved { cmd: code }),
                    persist: true,
                    undo: None,
                    save_settings: true,
                });
            }
            Command::QueryStatus => {
                let identity = self.config.identity;
                let report = state
                    .status_report()
                    .with_identity(identity.firmware_version, identity.product_id);
                return Ok(Applied::reply(Response::Status { cmd: code, report }));
            }
            Command::ReadSetting { offset, len } => {
                let value = live.with_settings(|block| live::read_block(block, offset, len))?;
                return Ok(Applied::reply(Response::Data {
                    cmd: code,
                    offset,
                    len,
                    value,
                }));
            }
            Command::UpdateSetting { offset, len, value } => {
                let value =
                    live.with_settings(|block| live::write_block(block, offset, len, &value))?;
                debug!("Setting at {=u16} updated", offset);
                return Ok(Applied::reply(Response::Data {
                    cmd: code,
                    offset,
                    len,
                    value,
                }));
            }
            Command::ReadMeasurement { offset, len } => {
                let value = live.with_measurements(|block| live::read_block(block, offset, len))?;
                return Ok(Applied::reply(Response::Data {
                    cmd: code,
                    offset,
                    len,
                    value,
                }));
            }
        };

        debug!("Override {} changed", index);
        Ok(Applied {
            response: Some(record_response(state, code, index)?),
            persist: self.config.persist_mode == PersistMode::OnChange,
            undo,
            save_settings: false,
        })
    }

    /// Check a WRITE payload against the parameter it targets
    ///
    /// Width 0 means "as declared". Any other width must match the
    /// descriptor, and value bytes past the declared width must be zero.
    fn write_value<const N: usize>(
        &self,
        state: &CalState<'_, N>,
        index: u8,
        value: &[u8; VALUE_LEN],
        width: u8,
    ) -> Result<CalValue, CalError> {
        let param = state
            .schema()
            .get(index as usize)
            .ok_or(CalError::IndexOutOfRange(index as usize))?;
        let expected = param.len();
        if width != 0 && width != expected {
            return Err(CalError::LengthMismatch {
                expected,
                actual: width,
            });
        }
        if let Some(last) = value.iter().rposition(|&b| b != 0) {
            let used = last as u8 + 1;
            if used > expected {
                return Err(CalError::LengthMismatch {
                    expected,
                    actual: used,
                });
            }
        }
        Ok(CalValue::from_wire(param.cal_type, value)?)
    }

    /// Decode, apply and persist one frame
    ///
    /// Returns `Ok(None)` for frames not addressed to this device. If the
    /// persist fails the table change is undone before the error returns.
    pub fn dispatch<S: EepromStorage, L: LiveData, const N: usize>(
        &self,
        state: &mut CalState<'_, N>,
        storage: &mut S,
        live: &mut L,
        frame: &CanFrame,
    ) -> Result<Option<Response>, CalError> {
        let Some(cmd) = self.decode(frame)? else {
            return Ok(None);
        };

        let applied = self.apply(state, live, cmd)?;
        if applied.persist {
            if let Err(e) = state.persist(storage) {
                if let Some(undo) = applied.undo {
                    undo.restore(state)?;
                    warn!("Persist failed, override {} rolled back", undo.index);
                }
                return Err(e);
            }
        }
        if applied.save_settings {
            live.save_settings()?;
        }
        Ok(applied.response)
    }

    /// Like [`dispatch`](Self::dispatch), but turns errors into NACKs
    pub fn process<S: EepromStorage, L: LiveData, const N: usize>(
        &self,
        state: &mut CalState<'_, N>,
        storage: &mut S,
        live: &mut L,
        frame: &CanFrame,
    ) -> Option<Response> {
        let result = self.dispatch(state, storage, live, frame);
        self.respond(frame, result)
    }

    /// Reply to send for `frame` given the result of handling it
    pub fn respond(
        &self,
        frame: &CanFrame,
        result: Result<Option<Response>, CalError>,
    ) -> Option<Response> {
        match result {
            Ok(response) => response,
            Err(e) => {
                warn!("Rejected command {=u8:#x}: {}", frame.command_byte(), e);
                self.nack(frame, &e)
            }
        }
    }

    /// NACK for a rejected frame, if error replies are enabled
    pub fn nack(&self, frame: &CanFrame, error: &CalError) -> Option<Response> {
        if !self.config.reply_errors {
            return None;
        }
        let (rejected, _) = self.config.addressing.split(frame.command_byte());
        Some(Response::Nack {
            cmd: self.config.codes.nack,
            rejected,
            reason: error.nack_reason(),
            index: frame.data[1],
        })
    }

    /// Frame carrying `response` back to the tool
    ///
    /// With device addressing the first byte carries this device's id.
    pub fn reply_frame(&self, request: &CanFrame, response: &Response) -> CanFrame {
        let mut data = response.encode();
        data[0] = self.config.addressing.stamp(data[0]);
        CanFrame::new(self.config.reply_id(request.id), data)
    }
}

fn record_response<const N: usize>(
    state: &CalState<'_, N>,
    cmd: u8,
    index: u8,
) -> Result<Response, CalError> {
    let record = state.record(index as usize)?;
    Ok(Response::Record {
        cmd,
        index,
        status: record.status.as_u8(),
        value: record.value.to_wire()?,
        width: record.value.cal_type().width(),
    })
}
