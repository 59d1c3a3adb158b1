//! EEPROM storage abstractions
//!
//! Provides the byte-addressed storage trait the override table is
//! persisted through, plus a RAM-backed implementation for memory-mapped
//! media and host testing.

/// Value of an erased storage cell
pub const ERASED_BYTE: u8 = 0xFF;

/// Errors from storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Reading the given address failed
    Read(u16),
    /// Writing the given address failed
    Write(u16),
    /// Flushing buffered writes failed
    Commit,
    /// Address is beyond the end of the medium
    OutOfBounds(u16),
}

/// EEPROM storage trait
///
/// Implementations must make [`commit`](EepromStorage::commit) atomic with
/// respect to power loss: either every byte written since the previous
/// commit becomes durable, or none does. Media that write through (true
/// EEPROM) can implement it as a no-op.
///
/// No retries are expected from callers; an implementation that wants
/// them must do them internally.
pub trait EepromStorage {
    /// Read one byte
    fn read_byte(&mut self, addr: u16) -> Result<u8, StorageError>;

    /// Write one byte
    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), StorageError>;

    /// Make all previous writes durable
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Fill `buffer` starting at `addr`
    fn read_into(&mut self, addr: u16, buffer: &mut [u8]) -> Result<(), StorageError> {
        for (offset, slot) in buffer.iter_mut().enumerate() {
            let at = offset_addr(addr, offset)?;
            *slot = self.read_byte(at)?;
        }
        Ok(())
    }

    /// Write `data` starting at `addr`
    fn write_from(&mut self, addr: u16, data: &[u8]) -> Result<(), StorageError> {
        for (offset, &byte) in data.iter().enumerate() {
            let at = offset_addr(addr, offset)?;
            self.write_byte(at, byte)?;
        }
        Ok(())
    }
}

fn offset_addr(base: u16, offset: usize) -> Result<u16, StorageError> {
    u16::try_from(offset)
        .ok()
        .and_then(|o| base.checked_add(o))
        .ok_or(StorageError::OutOfBounds(base))
}

/// RAM-backed storage with commit semantics
///
/// Writes land in a working bank and only become durable on `commit()`,
/// which copies the working bank over the durable one. `power_cycle()`
/// throws the working bank away, which is what a reset before commit does
/// to buffered flash-emulated EEPROM.
///
/// Fault injection hooks let tests exercise storage failures and
/// corrupted images.
#[derive(Debug, Clone)]
pub struct RamEeprom<const N: usize> {
    durable: [u8; N],
    working: [u8; N],
    fail_reads: bool,
    fail_writes: bool,
    fail_commit: bool,
    writes: u32,
    commits: u32,
}

impl<const N: usize> Default for RamEeprom<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RamEeprom<N> {
    /// Create an erased medium
    pub const fn new() -> Self {
        Self {
            durable: [ERASED_BYTE; N],
            working: [ERASED_BYTE; N],
            fail_reads: false,
            fail_writes: false,
            fail_commit: false,
            writes: 0,
            commits: 0,
        }
    }

    /// Storage size in bytes
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop uncommitted writes, as a reset would
    pub fn power_cycle(&mut self) {
        self.working = self.durable;
    }

    /// Durable contents
    pub fn contents(&self) -> &[u8; N] {
        &self.durable
    }

    /// XOR `mask` into the byte at `addr`, in both banks
    pub fn corrupt(&mut self, addr: usize, mask: u8) {
        if addr < N {
            self.durable[addr] ^= mask;
            self.working[addr] ^= mask;
        }
    }

    /// Make every read fail
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make every write fail
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make every commit fail
    pub fn set_fail_commit(&mut self, fail: bool) {
        self.fail_commit = fail;
    }

    /// Number of successful byte writes
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> u32 {
        self.commits
    }

    fn index(addr: u16) -> Result<usize, StorageError> {
        let idx = addr as usize;
        if idx >= N {
            return Err(StorageError::OutOfBounds(addr));
        }
        Ok(idx)
    }
}

impl<const N: usize> EepromStorage for RamEeprom<N> {
    fn read_byte(&mut self, addr: u16) -> Result<u8, StorageError> {
        let idx = Self::index(addr)?;
        if self.fail_reads {
            return Err(StorageError::Read(addr));
        }
        Ok(self.working[idx])
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), StorageError> {
        let idx = Self::index(addr)?;
        if self.fail_writes {
            return Err(StorageError::Write(addr));
        }
        self.working[idx] = value;
        self.writes = self.writes.wrapping_add(1);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.fail_commit {
            return Err(StorageError::Commit);
        }
        self.durable = self.working;
        self.commits = self.commits.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_medium_is_erased() {
        let mut eeprom = RamEeprom::<16>::new();
        assert_eq!(eeprom.read_byte(0), Ok(ERASED_BYTE));
        assert_eq!(eeprom.read_byte(15), Ok(ERASED_BYTE));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut eeprom = RamEeprom::<16>::new();
        assert_eq!(eeprom.read_byte(16), Err(StorageError::OutOfBounds(16)));
        assert_eq!(
            eeprom.write_byte(100, 1),
            Err(StorageError::OutOfBounds(100))
        );
    }

    #[test]
    fn test_uncommitted_writes_lost_on_power_cycle() {
        let mut eeprom = RamEeprom::<16>::new();
        eeprom.write_byte(3, 0x42).unwrap();
        assert_eq!(eeprom.read_byte(3), Ok(0x42));

        eeprom.power_cycle();
        assert_eq!(eeprom.read_byte(3), Ok(ERASED_BYTE));
    }

    #[test]
    fn test_committed_writes_survive_power_cycle() {
        let mut eeprom = RamEeprom::<16>::new();
        eeprom.write_from(2, &[1, 2, 3]).unwrap();
        eeprom.commit().unwrap();
        eeprom.power_cycle();

        let mut buf = [0u8; 3];
        eeprom.read_into(2, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(eeprom.commit_count(), 1);
        assert_eq!(eeprom.write_count(), 3);
    }

    #[test]
    fn test_fault_injection() {
        let mut eeprom = RamEeprom::<16>::new();
        eeprom.set_fail_writes(true);
        assert_eq!(eeprom.write_byte(1, 0), Err(StorageError::Write(1)));

        eeprom.set_fail_reads(true);
        assert_eq!(eeprom.read_byte(4), Err(StorageError::Read(4)));

        eeprom.set_fail_commit(true);
        assert_eq!(eeprom.commit(), Err(StorageError::Commit));
    }

    #[test]
    fn test_write_from_overflowing_address_space() {
        let mut eeprom = RamEeprom::<16>::new();
        let result = eeprom.write_from(u16::MAX, &[0, 0]);
        assert!(result.is_err());
    }
}
