//! Board-agnostic calibration override engine
//!
//! Lets a calibration tool override individual firmware settings over CAN
//! without reflashing:
//!
//! - Typed override table with per-parameter passthrough/override status
//! - Command dispatcher for the YACP frames
//! - EEPROM persistence guarded by a schema version and a CRC
//! - Settings merge for the control loop
//! - Byte-wise access to live settings and measurements
//! - Mutex-protected shared state and a bus-facing node

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod live;
pub mod merge;
pub mod node;
pub mod persist;
pub mod schema;
pub mod shared;
pub mod state;
pub mod table;

pub use codec::{ByteOrder, CalScalar, CalType, CalValue};
pub use config::{DeviceIdentity, PersistConfig, PersistMode, ProtocolConfig};
pub use dispatch::Dispatcher;
pub use error::CalError;
pub use live::{LiveBlocks, LiveData};
pub use node::{CalNode, NodeError};
pub use persist::{Diagnostics, LoadOutcome, PersistenceManager};
pub use schema::{ParamDescriptor, Schema};
pub use shared::SharedCal;
pub use state::CalState;
pub use table::{OverrideRecord, OverrideTable, Status};
