//! YACP Hardware Abstraction Layer
//!
//! This crate defines the collaborator traits the calibration engine is
//! driven through. Chip-specific code implements them for its CAN
//! peripheral and its non-volatile memory; the engine itself never
//! touches hardware.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Firmware (control loop, CAN ISR)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  yacp-core (override engine)            │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  yacp-hal (this crate - traits)         │
//! └─────────────────────────────────────────┘
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ CAN mailboxes │       │ EEPROM / NVM  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`can::CanTransport`] - Frame transmission and receive polling
//! - [`eeprom::EepromStorage`] - Byte-addressed persistent storage

#![no_std]
#![deny(unsafe_code)]

pub mod can;
pub mod eeprom;

// Re-export key traits at crate root for convenience
pub use can::{CanTransport, CAN_PAYLOAD_LEN};
pub use eeprom::{EepromStorage, RamEeprom, StorageError};
