//! Allocation history: a record of every resource movement.

use crate::state::{unix_now, ProcessId, Units};
use serde::{Deserialize, Serialize};

/// Direction of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// Units moved from available to the process.
    Allocate,
    /// Units moved from the process back to available.
    Release,
}

/// One movement of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Process involved.
    pub pid: ProcessId,
    /// Units moved per type.
    pub resources: Vec<Units>,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Direction.
    pub action: HistoryAction,
}

impl HistoryRecord {
    /// Record stamped now.
    pub fn now(pid: ProcessId, resources: Vec<Units>, action: HistoryAction) -> Self {
        Self {
            pid,
            resources,
            timestamp: unix_now(),
            action,
        }
    }
}
