//! Command and response messages
//!
//! Commands flow tool → device on the command identifier. Responses flow
//! device → tool, either on the same identifier or on a dedicated reply
//! identifier depending on the device configuration.

use crate::frame::{FrameError, FRAME_LEN, PROTOCOL_VERSION};

// Default sub-command codes. Settings, measurement, SAVE and HELLO codes
// keep the desktop tool's numbering; WRITE has no counterpart there.
pub const CMD_UPDATE_SETTING: u8 = 0x00;
pub const CMD_READ_SETTING: u8 = 0x01;
pub const CMD_ENABLE_OVERRIDE: u8 = 0x02;
pub const CMD_DISABLE_OVERRIDE: u8 = 0x03;
pub const CMD_READ: u8 = 0x04;
pub const CMD_READ_MEASUREMENT: u8 = 0x05;
pub const CMD_SAVE: u8 = 0x06;
pub const CMD_QUERY_STATUS: u8 = 0x07;
pub const CMD_WRITE: u8 = 0x09;
pub const CMD_NACK: u8 = 0x0F;

// Status report flag bits
const FLAG_VERSION_MISMATCH: u8 = 0x01;
const FLAG_CRC_MISMATCH: u8 = 0x02;
const LOAD_STATE_SHIFT: u8 = 2;
const LOAD_STATE_MASK: u8 = 0x03;

const CODE_MASK: u8 = 0x0F;

/// Sub-command byte values
///
/// Legacy tools disagree on code assignments, so the table is data rather
/// than a fixed enum discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandCodes {
    pub write: u8,
    pub read: u8,
    pub enable_override: u8,
    pub disable_override: u8,
    pub save: u8,
    pub query_status: u8,
    pub update_setting: u8,
    pub read_setting: u8,
    pub read_measurement: u8,
    pub nack: u8,
}

impl Default for CommandCodes {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl CommandCodes {
    /// Default code table
    ///
    /// Code values follow the desktop tool's numbering, but override
    /// commands address parameters by index rather than by table offset.
    pub const DEFAULT: Self = Self {
        write: CMD_WRITE,
        read: CMD_READ,
        enable_override: CMD_ENABLE_OVERRIDE,
        disable_override: CMD_DISABLE_OVERRIDE,
        save: CMD_SAVE,
        query_status: CMD_QUERY_STATUS,
        update_setting: CMD_UPDATE_SETTING,
        read_setting: CMD_READ_SETTING,
        read_measurement: CMD_READ_MEASUREMENT,
        nack: CMD_NACK,
    };

    /// True if no two commands share a code
    pub fn is_unambiguous(&self) -> bool {
        let codes = self.as_array();
        codes
            .iter()
            .enumerate()
            .all(|(i, a)| codes[i + 1..].iter().all(|b| a != b))
    }

    /// True if every code fits the low nibble, as device addressing needs
    pub fn fits_nibble(&self) -> bool {
        self.as_array().iter().all(|&c| c <= CODE_MASK)
    }

    fn as_array(&self) -> [u8; 10] {
        [
            self.write,
            self.read,
            self.enable_override,
            self.disable_override,
            self.save,
            self.query_status,
            self.update_setting,
            self.read_setting,
            self.read_measurement,
            self.nack,
        ]
    }
}

/// How the first payload byte carries the sub-command
///
/// With several devices on one bus the desktop tool puts the target
/// device id in the high nibble and the code in the low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Addressing {
    /// The whole byte is the code
    Direct,
    /// High nibble is the device id (0..=15)
    Device(u8),
}

impl Addressing {
    /// Largest addressable device id
    pub const MAX_DEVICE_ID: u8 = 0x0F;

    /// Code carried by `byte`, and the device it targets if addressed
    pub fn split(&self, byte: u8) -> (u8, Option<u8>) {
        match self {
            Addressing::Direct => (byte, None),
            Addressing::Device(_) => (byte & CODE_MASK, Some(byte >> 4)),
        }
    }

    /// First payload byte for a frame sent by this device
    pub fn stamp(&self, code: u8) -> u8 {
        match *self {
            Addressing::Direct => code,
            Addressing::Device(id) => (id << 4) | (code & CODE_MASK),
        }
    }
}

/// Load state of the persisted override image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadState {
    /// Nothing loaded yet this boot
    Unvalidated,
    /// Stored image matched schema and integrity check
    Validated,
    /// Stored image was rejected, table reset to passthrough
    Reset,
}

impl LoadState {
    /// Convert to wire format value
    pub fn to_byte(self) -> u8 {
        match self {
            LoadState::Unvalidated => 0,
            LoadState::Validated => 1,
            LoadState::Reset => 2,
        }
    }

    /// Parse from wire format value
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(LoadState::Unvalidated),
            1 => Some(LoadState::Validated),
            2 => Some(LoadState::Reset),
            _ => None,
        }
    }
}

/// Why a command was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NackReason {
    /// Parameter index or block offset out of range
    IndexOutOfRange,
    /// Value width disagrees with the parameter descriptor
    LengthMismatch,
    /// Sub-command byte not recognised
    UnknownCommand,
    /// Persisting failed; the change was rolled back
    Storage,
}

// Wire format values
const NACK_INDEX_OUT_OF_RANGE: u8 = 1;
const NACK_LENGTH_MISMATCH: u8 = 2;
const NACK_UNKNOWN_COMMAND: u8 = 3;
const NACK_STORAGE: u8 = 4;

impl NackReason {
    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            NackReason::IndexOutOfRange => NACK_INDEX_OUT_OF_RANGE,
            NackReason::LengthMismatch => NACK_LENGTH_MISMATCH,
            NackReason::UnknownCommand => NACK_UNKNOWN_COMMAND,
            NackReason::Storage => NACK_STORAGE,
        }
    }

    /// Parse from wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            NACK_INDEX_OUT_OF_RANGE => Some(NackReason::IndexOutOfRange),
            NACK_LENGTH_MISMATCH => Some(NackReason::LengthMismatch),
            NACK_UNKNOWN_COMMAND => Some(NackReason::UnknownCommand),
            NACK_STORAGE => Some(NackReason::Storage),
            _ => None,
        }
    }
}

/// Commands parsed from tool-originated frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Report the override record of a parameter
    Read { index: u8 },
    /// Store an override value and switch the parameter to overridden
    Write {
        index: u8,
        /// Little-endian value bytes, unused high bytes zero
        value: [u8; 4],
        /// Number of significant value bytes, 0 for the declared width
        width: u8,
    },
    /// Switch a parameter to its stored override value
    EnableOverride { index: u8 },
    /// Switch a parameter back to its compiled default
    DisableOverride { index: u8 },
    /// Persist the override table now
    Save,
    /// Report identity, protocol version and load diagnostics
    QueryStatus,
    /// Read one scalar of the live settings block
    ReadSetting { offset: u16, len: u8 },
    /// Write one scalar of the live settings block
    UpdateSetting { offset: u16, len: u8, value: [u8; 4] },
    /// Read one scalar of the measurement block
    ReadMeasurement { offset: u16, len: u8 },
}

impl Command {
    /// Parse a command from a frame payload
    ///
    /// `data[0]` must hold the bare code; see [`Addressing::split`].
    pub fn decode(codes: &CommandCodes, data: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        let cmd = data[0];
        let index = data[1];
        let offset = u16::from_le_bytes([data[1], data[2]]);
        let len = data[3];
        let block_value = [data[4], data[5], data[6], data[7]];

        if cmd == codes.read {
            Ok(Command::Read { index })
        } else if cmd == codes.write {
            Ok(Command::Write {
                index,
                value: [data[2], data[3], data[4], data[5]],
                width: data[6],
            })
        } else if cmd == codes.enable_override {
            Ok(Command::EnableOverride { index })
        } else if cmd == codes.disable_override {
            Ok(Command::DisableOverride { index })
        } else if cmd == codes.save {
            Ok(Command::Save)
        } else if cmd == codes.query_status {
            Ok(Command::QueryStatus)
        } else if cmd == codes.read_setting {
            Ok(Command::ReadSetting { offset, len })
        } else if cmd == codes.update_setting {
            Ok(Command::UpdateSetting {
                offset,
                len,
                value: block_value,
            })
        } else if cmd == codes.read_measurement {
            Ok(Command::ReadMeasurement { offset, len })
        } else {
            Err(FrameError::UnknownCommand(cmd))
        }
    }

    /// Encode this command into a frame payload (tool side and tests)
    pub fn encode(&self, codes: &CommandCodes) -> [u8; FRAME_LEN] {
        let mut data = [0u8; FRAME_LEN];
        data[0] = self.code(codes);
        match *self {
            Command::Write {
                index,
                value,
                width,
            } => {
                data[1] = index;
                data[2..6].copy_from_slice(&value);
                data[6] = width;
            }
            Command::Read { index }
            | Command::EnableOverride { index }
            | Command::DisableOverride { index } => data[1] = index,
            Command::ReadSetting { offset, len } | Command::ReadMeasurement { offset, len } => {
                data[1..3].copy_from_slice(&offset.to_le_bytes());
                data[3] = len;
            }
            Command::UpdateSetting { offset, len, value } => {
                data[1..3].copy_from_slice(&offset.to_le_bytes());
                data[3] = len;
                data[4..].copy_from_slice(&value);
            }
            Command::Save | Command::QueryStatus => {}
        }
        data
    }

    /// Sub-command byte for this command
    pub fn code(&self, codes: &CommandCodes) -> u8 {
        match self {
            Command::Read { .. } => codes.read,
            Command::Write { .. } => codes.write,
            Command::EnableOverride { .. } => codes.enable_override,
            Command::DisableOverride { .. } => codes.disable_override,
            Command::Save => codes.save,
            Command::QueryStatus => codes.query_status,
            Command::ReadSetting { .. } => codes.read_setting,
            Command::UpdateSetting { .. } => codes.update_setting,
            Command::ReadMeasurement { .. } => codes.read_measurement,
        }
    }

    /// Parameter index addressed by this command, if any
    pub fn index(&self) -> Option<u8> {
        match *self {
            Command::Read { index }
            | Command::Write { index, .. }
            | Command::EnableOverride { index }
            | Command::DisableOverride { index } => Some(index),
            _ => None,
        }
    }

    /// Returns true if this command can change the override table
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Write { .. } | Command::EnableOverride { .. } | Command::DisableOverride { .. }
        )
    }
}

/// Status query payload
///
/// Laid out so the desktop tool's HELLO parser finds the identity bytes
/// where it expects them: schema version low byte doubles as its
/// calibration revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusReport {
    pub protocol_version: u8,
    pub version_mismatch: bool,
    pub crc_mismatch: bool,
    pub schema_version: u16,
    pub param_count: u8,
    pub load_state: LoadState,
    pub firmware_version: u8,
    pub product_id: u8,
}

impl StatusReport {
    /// Build a report for this protocol revision, without identity
    pub fn new(
        version_mismatch: bool,
        crc_mismatch: bool,
        schema_version: u16,
        param_count: u8,
        load_state: LoadState,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            version_mismatch,
            crc_mismatch,
            schema_version,
            param_count,
            load_state,
            firmware_version: 0,
            product_id: 0,
        }
    }

    /// Attach the device identity
    pub fn with_identity(self, firmware_version: u8, product_id: u8) -> Self {
        Self {
            firmware_version,
            product_id,
            ..self
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = self.load_state.to_byte() << LOAD_STATE_SHIFT;
        if self.version_mismatch {
            flags |= FLAG_VERSION_MISMATCH;
        }
        if self.crc_mismatch {
            flags |= FLAG_CRC_MISMATCH;
        }
        flags
    }
}

/// Responses sent by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    /// Override record of one parameter, after the echoed command ran
    Record {
        cmd: u8,
        index: u8,
        status: u8,
        value: [u8; 4],
        width: u8,
    },
    /// Reply to a status query
    Status { cmd: u8, report: StatusReport },
    /// Table persisted
    Saved { cmd: u8 },
    /// One scalar of the settings or measurement block
    Data {
        cmd: u8,
        offset: u16,
        len: u8,
        value: [u8; 4],
    },
    /// Command rejected, nothing changed
    Nack {
        cmd: u8,
        rejected: u8,
        reason: NackReason,
        index: u8,
    },
}

impl Response {
    /// Sub-command byte this response starts with
    pub fn code(&self) -> u8 {
        match *self {
            Response::Record { cmd, .. }
            | Response::Status { cmd, .. }
            | Response::Saved { cmd }
            | Response::Data { cmd, .. }
            | Response::Nack { cmd, .. } => cmd,
        }
    }

    /// Encode this response into a frame payload
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        match *self {
            Response::Record {
                cmd,
                index,
                status,
                value,
                width,
            } => [
                cmd, status, value[0], value[1], value[2], value[3], index, width,
            ],
            Response::Status { cmd, report } => {
                let [lo, hi] = report.schema_version.to_le_bytes();
                [
                    cmd,
                    report.flags(),
                    report.param_count,
                    hi,
                    report.firmware_version,
                    report.product_id,
                    lo,
                    report.protocol_version,
                ]
            }
            Response::Saved { cmd } => [cmd, 0, 0, 0, 0, 0, 0, 0],
            Response::Data {
                cmd,
                offset,
                len,
                value,
            } => {
                let [lo, hi] = offset.to_le_bytes();
                [cmd, lo, hi, len, value[0], value[1], value[2], value[3]]
            }
            Response::Nack {
                cmd,
                rejected,
                reason,
                index,
            } => [cmd, rejected, reason.to_byte(), index, 0, 0, 0, 0],
        }
    }

    /// Parse a response from a frame payload (tool side and tests)
    ///
    /// `data[0]` must hold the bare code.
    pub fn decode(codes: &CommandCodes, data: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        let cmd = data[0];

        if cmd == codes.nack {
            let reason = NackReason::from_byte(data[2]).ok_or(FrameError::Malformed)?;
            Ok(Response::Nack {
                cmd,
                rejected: data[1],
                reason,
                index: data[3],
            })
        } else if cmd == codes.query_status {
            let flags = data[1];
            let load_state = LoadState::from_byte((flags >> LOAD_STATE_SHIFT) & LOAD_STATE_MASK)
                .ok_or(FrameError::Malformed)?;
            Ok(Response::Status {
                cmd,
                report: StatusReport {
                    protocol_version: data[7],
                    version_mismatch: flags & FLAG_VERSION_MISMATCH != 0,
                    crc_mismatch: flags & FLAG_CRC_MISMATCH != 0,
                    schema_version: u16::from_le_bytes([data[6], data[3]]),
                    param_count: data[2],
                    load_state,
                    firmware_version: data[4],
                    product_id: data[5],
                },
            })
        } else if cmd == codes.save {
            Ok(Response::Saved { cmd })
        } else if cmd == codes.read
            || cmd == codes.write
            || cmd == codes.enable_override
            || cmd == codes.disable_override
        {
            Ok(Response::Record {
                cmd,
                status: data[1],
                value: [data[2], data[3], data[4], data[5]],
                index: data[6],
                width: data[7],
            })
        } else if cmd == codes.read_setting
            || cmd == codes.update_setting
            || cmd == codes.read_measurement
        {
            Ok(Response::Data {
                cmd,
                offset: u16::from_le_bytes([data[1], data[2]]),
                len: data[3],
                value: [data[4], data[5], data[6], data[7]],
            })
        } else {
            Err(FrameError::UnknownCommand(cmd))
        }
    }
}
