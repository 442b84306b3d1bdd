//! Versioned snapshot of the whole system for export and import.
//!
//! The encoding is self-describing JSON with a `schema_version` field read
//! before the rest of the document.

use crate::coordinator::SimulationStats;
use crate::error::SnapshotError;
use crate::history::HistoryRecord;
use crate::ledger::{Block, Ledger};
use crate::state::ResourceState;
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Consistent copy of everything external formatters may show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Encoding version.
    pub schema_version: u32,
    /// Process table, totals and available vector.
    pub state: ResourceState,
    /// Ledger blocks, genesis first.
    pub ledger: Vec<Block>,
    /// Resource movements.
    pub history: Vec<HistoryRecord>,
    /// Counters.
    pub stats: SimulationStats,
}

#[derive(Deserialize)]
struct VersionHeader {
    schema_version: u32,
}

impl Snapshot {
    /// Assemble at the current schema version.
    pub fn new(
        state: ResourceState,
        ledger: Vec<Block>,
        history: Vec<HistoryRecord>,
        stats: SimulationStats,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            state,
            ledger,
            history,
            stats,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode JSON, rejecting other schema versions before decoding the body.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let header: VersionHeader = serde_json::from_str(text)?;
        if header.schema_version != SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: header.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Check the state invariants and the embedded ledger chain.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        if !self.state.is_feasible() {
            return Err(SnapshotError::Inconsistent(
                "allocation outside [0, max] or need out of sync".into(),
            ));
        }
        if !self.state.is_conserved() {
            return Err(SnapshotError::Inconsistent(
                "available plus allocated does not match total".into(),
            ));
        }
        let m = self.state.resource_types();
        if let Some(record) = self.history.iter().find(|h| h.resources.len() != m) {
            return Err(SnapshotError::Inconsistent(format!(
                "history record for {} has {} resource types",
                record.pid,
                record.resources.len()
            )));
        }
        Ledger::from_blocks(self.ledger.clone()).verify_integrity()?;
        Ok(())
    }
}
