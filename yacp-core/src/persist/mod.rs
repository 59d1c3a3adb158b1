//! Override table persistence
//!
//! Maps the override table onto a byte image in EEPROM and validates it
//! against the compiled schema on boot.
//!
//! # Image Format
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Schema version: u16 LE                        │  Offset: 0
//! ├───────────────────────────────────────────────┤
//! │ Records: N × [status: u8, value: [u8; 4] LE]  │  Offset: 2
//! ├───────────────────────────────────────────────┤
//! │ CRC32: u32 LE (over version and records)      │  Offset: 2 + 5N
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The version is checked before the CRC. An image written for a
//! different layout is reported as a schema mismatch only; its CRC is not
//! evaluated.

pub mod crc;

pub use crc::{Crc32, Digest};

use yacp_hal::{EepromStorage, StorageError};
use yacp_protocol::LoadState;

use crate::config::PersistConfig;
use crate::error::CalError;
use crate::schema::Schema;
use crate::table::{OverrideRecord, OverrideTable, RECORD_LEN};

/// Bytes taken by the schema version
pub const VERSION_LEN: usize = 2;

/// Bytes taken by the integrity check
pub const CRC_LEN: usize = 4;

/// Total image size for `param_count` parameters
pub const fn image_len(param_count: usize) -> usize {
    VERSION_LEN + param_count * RECORD_LEN + CRC_LEN
}

/// Sticky diagnostics raised while loading the image
///
/// Stay set for the rest of the run unless explicitly cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// Stored schema version differed from the compiled one
    pub version_mismatch: bool,
    /// Stored CRC did not match the stored bytes
    pub crc_mismatch: bool,
}

impl Diagnostics {
    /// True if either flag is raised
    pub fn any(&self) -> bool {
        self.version_mismatch || self.crc_mismatch
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Result of validating the stored image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadOutcome {
    /// Image accepted, table populated from it
    Validated,
    /// Image written for another layout, table reset
    SchemaMismatch { stored: u16, expected: u16 },
    /// Image bytes corrupted, table reset
    IntegrityMismatch,
}

impl LoadOutcome {
    /// Load state this outcome leaves the engine in
    pub fn state(&self) -> LoadState {
        match self {
            LoadOutcome::Validated => LoadState::Validated,
            LoadOutcome::SchemaMismatch { .. } | LoadOutcome::IntegrityMismatch => LoadState::Reset,
        }
    }
}

/// Owner of the persisted image
///
/// Loads once per boot; the first completed load is final for the session.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    config: PersistConfig,
    outcome: Option<LoadOutcome>,
}

impl PersistenceManager {
    pub const fn new(config: PersistConfig) -> Self {
        Self {
            config,
            outcome: None,
        }
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Where this boot's load ended up
    pub fn state(&self) -> LoadState {
        self.outcome
            .map(|o| o.state())
            .unwrap_or(LoadState::Unvalidated)
    }

    /// Outcome of this boot's load, if it completed
    pub fn outcome(&self) -> Option<LoadOutcome> {
        self.outcome
    }

    /// Validate the stored image and populate `table` from it
    ///
    /// The whole image is read and checked before any record reaches
    /// `table`. On a version or CRC mismatch the matching flag in `diag`
    /// is raised and `table` is reset to passthrough.
    ///
    /// A storage failure leaves `table`, `diag` and the load state as they
    /// were; the caller decides whether to retry.
    pub fn load<S: EepromStorage, const N: usize>(
        &mut self,
        storage: &mut S,
        schema: &Schema<N>,
        table: &mut OverrideTable<N>,
        diag: &mut Diagnostics,
    ) -> Result<LoadOutcome, CalError> {
        if let Some(outcome) = self.outcome {
            warn!("Override image already loaded this boot");
            return Ok(outcome);
        }

        let outcome = self.validate(storage, schema, table)?;
        match outcome {
            LoadOutcome::Validated => {
                info!(
                    "Loaded override image v{}, {} override(s) active",
                    schema.version,
                    table.overridden_count()
                );
            }
            LoadOutcome::SchemaMismatch { stored, expected } => {
                warn!(
                    "Override image schema v{} != v{}, using defaults",
                    stored, expected
                );
                diag.version_mismatch = true;
                table.reset(schema);
            }
            LoadOutcome::IntegrityMismatch => {
                warn!("Override image CRC mismatch, using defaults");
                diag.crc_mismatch = true;
                table.reset(schema);
            }
        }

        self.outcome = Some(outcome);
        Ok(outcome)
    }

    /// Check the stored image, copying it into `table` only if it passes
    fn validate<S: EepromStorage, const N: usize>(
        &self,
        storage: &mut S,
        schema: &Schema<N>,
        table: &mut OverrideTable<N>,
    ) -> Result<LoadOutcome, CalError> {
        let base = self.config.base_address;
        address(base, image_len(N) - 1)?;

        let mut version = [0u8; VERSION_LEN];
        storage.read_into(base, &mut version)?;
        let stored = u16::from_le_bytes(version);
        if stored != schema.version {
            return Ok(LoadOutcome::SchemaMismatch {
                stored,
                expected: schema.version,
            });
        }

        let mut digest = self.config.crc.digest();
        digest.update(&version);

        let mut staged = OverrideTable::new(schema);
        let mut corrupt_record = false;
        for (index, param) in schema.params.iter().enumerate() {
            let mut bytes = [0u8; RECORD_LEN];
            storage.read_into(address(base, record_offset(index))?, &mut bytes)?;
            digest.update(&bytes);

            match OverrideRecord::from_bytes(param.cal_type, &bytes)? {
                Some(record) => staged.set(index, record)?,
                None => {
                    debug!("Record {} has invalid status byte {}", index, bytes[0]);
                    corrupt_record = true;
                }
            }
        }

        let mut stored_crc = [0u8; CRC_LEN];
        storage.read_into(address(base, record_offset(N))?, &mut stored_crc)?;
        let stored_crc = u32::from_le_bytes(stored_crc);
        let computed = digest.finalize();

        if stored_crc != computed || corrupt_record {
            debug!("Stored CRC {=u32:#x}, computed {=u32:#x}", stored_crc, computed);
            return Ok(LoadOutcome::IntegrityMismatch);
        }

        *table = staged;
        Ok(LoadOutcome::Validated)
    }

    /// Write the full image for `table` and commit it
    ///
    /// Always rewrites the whole image. Returns the number of bytes written.
    pub fn persist<S: EepromStorage, const N: usize>(
        &self,
        storage: &mut S,
        schema: &Schema<N>,
        table: &OverrideTable<N>,
    ) -> Result<usize, CalError> {
        let base = self.config.base_address;
        let len = image_len(N);
        address(base, len - 1)?;

        debug!("Persisting {} bytes of overrides", len);

        let mut digest = self.config.crc.digest();
        let version = schema.version.to_le_bytes();
        storage.write_from(base, &version)?;
        digest.update(&version);

        for (index, record) in table.records().iter().enumerate() {
            let bytes = record.to_bytes()?;
            storage.write_from(address(base, record_offset(index))?, &bytes)?;
            digest.update(&bytes);
        }

        let crc = digest.finalize();
        storage.write_from(address(base, record_offset(N))?, &crc.to_le_bytes())?;
        storage.commit()?;

        info!(
            "Persisted override image, {} override(s) active",
            table.overridden_count()
        );
        Ok(len)
    }
}

/// Image offset of record `index`; `index == N` gives the CRC offset
const fn record_offset(index: usize) -> usize {
    VERSION_LEN + index * RECORD_LEN
}

fn address(base: u16, offset: usize) -> Result<u16, CalError> {
    u16::try_from(offset)
        .ok()
        .and_then(|o| base.checked_add(o))
        .ok_or(CalError::Storage(StorageError::OutOfBounds(base)))
}
