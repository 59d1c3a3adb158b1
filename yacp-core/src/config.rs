//! Engine configuration
//!
//! Everything a device may need to tune to match an existing calibration
//! tool: identifiers, sub-command codes, when to write EEPROM, where the
//! image lives and which CRC guards it.

use yacp_protocol::{Addressing, CommandCodes, YACP_COMMAND_ID};

use crate::persist::Crc32;

/// When state-changing commands reach non-volatile storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistMode {
    /// Persist after every WRITE, ENABLE and DISABLE
    OnChange,
    /// Persist only when the tool sends SAVE
    Explicit,
}

/// Identity reported in the status reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentity {
    pub firmware_version: u8,
    pub product_id: u8,
}

/// Bus-facing protocol settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolConfig {
    /// Arbitration identifier commands arrive on
    pub command_id: u32,
    /// Arbitration identifier for replies, `None` to mirror the request
    pub response_id: Option<u32>,
    /// Sub-command byte values
    pub codes: CommandCodes,
    pub persist_mode: PersistMode,
    /// Answer rejected commands with a NACK frame instead of silence
    pub reply_errors: bool,
    /// Whether the first payload byte carries a device id
    pub addressing: Addressing,
    pub identity: DeviceIdentity,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ProtocolConfig {
    pub const DEFAULT: Self = Self {
        command_id: YACP_COMMAND_ID,
        response_id: None,
        codes: CommandCodes::DEFAULT,
        persist_mode: PersistMode::OnChange,
        reply_errors: true,
        addressing: Addressing::Direct,
        identity: DeviceIdentity {
            firmware_version: 0,
            product_id: 0,
        },
    };

    /// Identifier to reply on for a request that arrived on `request_id`
    pub fn reply_id(&self, request_id: u32) -> u32 {
        self.response_id.unwrap_or(request_id)
    }
}

/// Persisted image settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistConfig {
    /// First EEPROM address of the image
    pub base_address: u16,
    pub crc: Crc32,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl PersistConfig {
    pub const DEFAULT: Self = Self {
        base_address: 0,
        crc: Crc32::IEEE,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use yacp_protocol::YACP_RESPONSE_ID;

    #[test]
    fn test_reply_mirrors_request_by_default() {
        let config = ProtocolConfig::default();
        assert_eq!(config.reply_id(YACP_COMMAND_ID), YACP_COMMAND_ID);
    }

    #[test]
    fn test_dedicated_reply_id() {
        let config = ProtocolConfig {
            response_id: Some(YACP_RESPONSE_ID),
            ..ProtocolConfig::DEFAULT
        };
        assert_eq!(config.reply_id(YACP_COMMAND_ID), YACP_RESPONSE_ID);
    }
}
