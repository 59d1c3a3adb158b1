//! Calibration engine state
//!
//! [`CalState`] is the single owner of everything the engine keeps across
//! frames: the override table, the persistence manager and the sticky
//! diagnostics. Firmware creates one at startup and keeps it for the life
//! of the process; tests can create as many as they like.

use yacp_hal::EepromStorage;
use yacp_protocol::{LoadState, StatusReport};

use crate::codec::{CalScalar, CalValue};
use crate::config::PersistConfig;
use crate::error::CalError;
use crate::merge;
use crate::persist::{Diagnostics, LoadOutcome, PersistenceManager};
use crate::schema::Schema;
use crate::table::{OverrideRecord, OverrideTable};

/// Override engine state for one schema
#[derive(Debug, Clone)]
pub struct CalState<'a, const N: usize> {
    schema: &'a Schema<N>,
    table: OverrideTable<N>,
    persistence: PersistenceManager,
    diagnostics: Diagnostics,
}

impl<'a, const N: usize> CalState<'a, N> {
    /// Unloaded state: every parameter passthrough, nothing validated yet
    pub fn new(schema: &'a Schema<N>, config: PersistConfig) -> Self {
        Self {
            schema,
            table: OverrideTable::new(schema),
            persistence: PersistenceManager::new(config),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Load the persisted overrides; call once at startup
    ///
    /// A stale or corrupted image is not an error: the table stays all
    /// passthrough, the matching diagnostic flag is raised, and a fresh
    /// default image is written so the next boot validates.
    pub fn init<S: EepromStorage>(&mut self, storage: &mut S) -> Result<LoadOutcome, CalError> {
        let outcome = self.persistence.load(
            storage,
            self.schema,
            &mut self.table,
            &mut self.diagnostics,
        )?;

        if outcome != LoadOutcome::Validated {
            info!("Writing default override image");
            self.persist(storage)?;
        }
        Ok(outcome)
    }

    /// Write the current table to storage
    pub fn persist<S: EepromStorage>(&self, storage: &mut S) -> Result<usize, CalError> {
        self.persistence.persist(storage, self.schema, &self.table)
    }

    /// Full settings reset: all passthrough, stored values cleared, persisted
    pub fn reset_to_defaults<S: EepromStorage>(&mut self, storage: &mut S) -> Result<(), CalError> {
        info!("Resetting all overrides");
        self.table.reset(self.schema);
        self.persist(storage)?;
        Ok(())
    }

    pub fn schema(&self) -> &'a Schema<N> {
        self.schema
    }

    pub fn table(&self) -> &OverrideTable<N> {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut OverrideTable<N> {
        &mut self.table
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    /// Override record for `index`
    pub fn record(&self, index: usize) -> Result<OverrideRecord, CalError> {
        Ok(self.table.get(index)?)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn version_mismatch(&self) -> bool {
        self.diagnostics.version_mismatch
    }

    pub fn crc_mismatch(&self) -> bool {
        self.diagnostics.crc_mismatch
    }

    /// Lower both sticky flags
    pub fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
    }

    pub fn load_state(&self) -> LoadState {
        self.persistence.state()
    }

    /// Payload for a status query
    pub fn status_report(&self) -> StatusReport {
        StatusReport::new(
            self.diagnostics.version_mismatch,
            self.diagnostics.crc_mismatch,
            self.schema.version,
            N as u8,
            self.load_state(),
        )
    }

    /// Effective value of parameter `index`, see [`merge::effective_value`]
    pub fn effective_value(&self, index: usize, default: CalValue) -> CalValue {
        merge::effective_value(&self.table, index, default)
    }

    /// Typed effective value of parameter `index`
    pub fn effective<T: CalScalar>(&self, index: usize, default: T) -> T {
        merge::effective(&self.table, index, default)
    }

    /// Patch a live settings block with every active override
    pub fn apply_overrides(&self, settings: &mut [u8]) -> Result<usize, CalError> {
        merge::apply_overrides(self.schema, &self.table, settings)
    }
}
