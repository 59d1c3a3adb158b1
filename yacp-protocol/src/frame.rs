//! CAN frame representation for the calibration protocol.
//!
//! Override commands (payload, always 8 bytes):
//! - CMD (1 byte): sub-command code, optionally with a device id in the
//!   high nibble
//! - INDEX (1 byte): parameter index
//! - VALUE (4 bytes): little-endian value, WRITE only
//! - WIDTH (1 byte): value width in bytes, WRITE only, 0 for "as declared"
//! - PAD (1 byte): zero
//!
//! Settings and measurement commands:
//! - CMD (1 byte)
//! - OFFSET (2 bytes): little-endian byte offset into the block
//! - LEN (1 byte): 1, 2 or 4
//! - VALUE (4 bytes): little-endian value

/// Default arbitration identifier for calibration commands
pub const YACP_COMMAND_ID: u32 = 0x100;

/// Arbitration identifier the desktop tool listens on for replies
pub const YACP_RESPONSE_ID: u32 = 0x101;

/// Protocol revision reported by the status query
pub const PROTOCOL_VERSION: u8 = 1;

/// Payload length of every protocol frame
pub const FRAME_LEN: usize = 8;

/// Errors that can occur while decoding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Frame is not addressed to the calibration engine
    WrongId(u32),
    /// Sub-command byte is not a known command
    UnknownCommand(u8),
    /// Payload does not fit the expected layout
    Malformed,
}

/// A classic CAN data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    /// Arbitration identifier
    pub id: u32,
    /// Payload, unused bytes zero
    pub data: [u8; FRAME_LEN],
}

impl CanFrame {
    /// Create a frame from an identifier and a full payload
    pub const fn new(id: u32, data: [u8; FRAME_LEN]) -> Self {
        Self { id, data }
    }

    /// Create a frame from a short payload, zero padding the tail
    pub fn from_slice(id: u32, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > FRAME_LEN {
            return Err(FrameError::Malformed);
        }
        let mut data = [0u8; FRAME_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self { id, data })
    }

    /// Sub-command byte
    pub fn command_byte(&self) -> u8 {
        self.data[0]
    }

    /// Ensure the frame carries the given identifier
    pub fn expect_id(&self, id: u32) -> Result<(), FrameError> {
        if self.id != id {
            return Err(FrameError::WrongId(self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_pads_with_zero() {
        let frame = CanFrame::from_slice(YACP_COMMAND_ID, &[0x04, 2]).unwrap();
        assert_eq!(frame.data, [0x04, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frame.command_byte(), 0x04);
    }

    #[test]
    fn test_from_slice_too_long() {
        let result = CanFrame::from_slice(YACP_COMMAND_ID, &[0u8; 9]);
        assert_eq!(result, Err(FrameError::Malformed));
    }

    #[test]
    fn test_expect_id() {
        let frame = CanFrame::new(0x200, [0; FRAME_LEN]);
        assert_eq!(frame.expect_id(YACP_COMMAND_ID), Err(FrameError::WrongId(0x200)));
        assert!(frame.expect_id(0x200).is_ok());
    }
}
