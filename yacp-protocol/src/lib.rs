//! YACP CAN Calibration Protocol
//!
//! This crate defines the frames exchanged between a calibration tool and
//! a device running the override engine. Every transaction is a single
//! classic CAN data frame with an 8-byte payload.
//!
//! # Protocol Overview
//!
//! Requests arrive on the reserved command identifier:
//! ```text
//! ┌──────┬───────┬─────────────────┬───────┬─────┐
//! │ CMD  │ INDEX │ VALUE (LE)      │ WIDTH │ PAD │
//! │ 1B   │ 1B    │ 4B              │ 1B    │ 1B  │
//! └──────┴───────┴─────────────────┴───────┴─────┘
//! ```
//!
//! Settings and measurement commands carry a byte offset and length
//! instead of a parameter index. Replies echo the sub-command.
//! Sub-command byte values are configurable through [`CommandCodes`] so
//! a device can match an existing tool, and [`Addressing`] can put a
//! device id in the high nibble of the first byte.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod frame;
pub mod messages;

pub use frame::{CanFrame, FrameError, FRAME_LEN, PROTOCOL_VERSION, YACP_COMMAND_ID, YACP_RESPONSE_ID};
pub use messages::{Addressing, Command, CommandCodes, LoadState, NackReason, Response, StatusReport};
