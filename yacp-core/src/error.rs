//! Engine error type

use yacp_hal::StorageError;
use yacp_protocol::{FrameError, NackReason};

use crate::codec::CodecError;
use crate::table::TableError;

/// Errors surfaced by the engine
///
/// A command that fails with any of these leaves the override table as
/// it was; a `Storage` failure rolls back the change it tried to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalError {
    /// Parameter index beyond the compiled parameter count
    IndexOutOfRange(usize),
    /// WRITE width disagrees with the parameter descriptor
    LengthMismatch { expected: u8, actual: u8 },
    /// Settings or measurement access past the end of the block
    OutOfBlock { offset: u16, len: u8 },
    /// Codec asked for an unsupported scalar width
    InvalidLength(usize),
    /// Value type disagrees with the parameter descriptor
    TypeMismatch(usize),
    /// Sub-command byte not recognised
    UnknownCommand(u8),
    /// Frame payload does not fit the protocol layout
    Malformed,
    /// Underlying storage failed
    Storage(StorageError),
}

impl CalError {
    /// Reason code reported to the tool in a NACK
    pub fn nack_reason(&self) -> NackReason {
        match self {
            CalError::IndexOutOfRange(_) | CalError::OutOfBlock { .. } => {
                NackReason::IndexOutOfRange
            }
            CalError::LengthMismatch { .. }
            | CalError::InvalidLength(_)
            | CalError::TypeMismatch(_) => NackReason::LengthMismatch,
            CalError::UnknownCommand(_) | CalError::Malformed => NackReason::UnknownCommand,
            CalError::Storage(_) => NackReason::Storage,
        }
    }
}

impl From<StorageError> for CalError {
    fn from(e: StorageError) -> Self {
        CalError::Storage(e)
    }
}

impl From<CodecError> for CalError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::InvalidLength(len) => CalError::InvalidLength(len),
        }
    }
}

impl From<TableError> for CalError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::IndexOutOfRange(index) => CalError::IndexOutOfRange(index),
            TableError::TypeMismatch(index) => CalError::TypeMismatch(index),
        }
    }
}

impl From<FrameError> for CalError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::UnknownCommand(cmd) => CalError::UnknownCommand(cmd),
            FrameError::WrongId(_) | FrameError::Malformed => CalError::Malformed,
        }
    }
}
