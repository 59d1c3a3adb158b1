//! Live settings and measurement blocks
//!
//! The firmware owns its settings and measurement structs; the engine
//! only reaches into them byte-wise when the tool asks to read a
//! measurement or to read or patch a setting. Blocks are in native byte
//! order, values on the wire little-endian.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use yacp_hal::StorageError;

use crate::codec::VALUE_LEN;
use crate::error::CalError;
use crate::merge;

/// Access to the firmware's live data
pub trait LiveData {
    /// Run `f` on the settings block
    fn with_settings<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R;

    /// Run `f` on the measurement block
    fn with_measurements<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R;

    /// Make the settings block durable; called on SAVE
    fn save_settings(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// No live data: every settings or measurement access is out of range
impl LiveData for () {
    fn with_settings<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut [])
    }

    fn with_measurements<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&[])
    }
}

impl<T: LiveData + ?Sized> LiveData for &mut T {
    fn with_settings<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        (**self).with_settings(f)
    }

    fn with_measurements<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        (**self).with_measurements(f)
    }

    fn save_settings(&mut self) -> Result<(), StorageError> {
        (**self).save_settings()
    }
}

/// Blocks shared with the control loop behind a blocking mutex
impl<M: RawMutex, T: LiveData> LiveData for &Mutex<M, RefCell<T>> {
    fn with_settings<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.lock(|cell| cell.borrow_mut().with_settings(f))
    }

    fn with_measurements<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.lock(|cell| cell.borrow_mut().with_measurements(f))
    }

    fn save_settings(&mut self) -> Result<(), StorageError> {
        self.lock(|cell| cell.borrow_mut().save_settings())
    }
}

/// Plain byte blocks owned in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveBlocks<const S: usize, const M: usize> {
    pub settings: [u8; S],
    pub measurements: [u8; M],
}

impl<const S: usize, const M: usize> LiveBlocks<S, M> {
    pub const fn new(settings: [u8; S], measurements: [u8; M]) -> Self {
        Self {
            settings,
            measurements,
        }
    }
}

impl<const S: usize, const M: usize> LiveData for LiveBlocks<S, M> {
    fn with_settings<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.settings)
    }

    fn with_measurements<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.measurements)
    }
}

fn check_range(block_len: usize, offset: u16, len: u8) -> Result<(), CalError> {
    if !matches!(len, 1 | 2 | 4) {
        return Err(CalError::InvalidLength(len as usize));
    }
    if offset as usize + len as usize > block_len {
        return Err(CalError::OutOfBlock { offset, len });
    }
    Ok(())
}

/// Read one scalar of `block` into a wire slot
pub fn read_block(block: &[u8], offset: u16, len: u8) -> Result<[u8; VALUE_LEN], CalError> {
    check_range(block.len(), offset, len)?;
    Ok(merge::read_setting(block, offset as usize, len as usize)?)
}

/// Patch one scalar of `block` from a wire slot, returning the stored bytes
pub fn write_block(
    block: &mut [u8],
    offset: u16,
    len: u8,
    value: &[u8; VALUE_LEN],
) -> Result<[u8; VALUE_LEN], CalError> {
    check_range(block.len(), offset, len)?;
    merge::update_setting(block, offset as usize, len as usize, value)?;
    read_block(block, offset, len)
}
