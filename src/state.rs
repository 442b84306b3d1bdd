//! Resource state: the process table and the available-resource vector.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use crate::error::AllocError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Count of resource units. Signed so callers' negative input can be rejected.
pub type Units = i64;

/// Unique identifier for a process. Stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub usize);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Lifecycle of a process. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Competing for resources.
    Active,
    /// Finished or terminated; excluded from safety and deadlock search.
    Completed,
}

/// A competing process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    /// Identity; equals the process's index in the table.
    pub id: ProcessId,
    /// Declared per-type ceiling, fixed at creation.
    pub max: Vec<Units>,
    /// Units currently held per type.
    pub allocation: Vec<Units>,
    /// `max - allocation`, kept in sync on every move.
    pub need: Vec<Units>,
    /// Active or completed.
    pub status: ProcessStatus,
    /// Victim-selection tie-break; lower is sacrificed first.
    pub priority: u32,
    /// Creation time, seconds since the Unix epoch.
    pub start_time: u64,
    /// Completion time, if completed.
    pub end_time: Option<u64>,
    /// Number of denied requests.
    pub wait_time: u64,
    /// Simulated CPU usage sample in `[0, 1)`.
    pub cpu_usage: f64,
}

impl Process {
    /// Create an active process holding nothing.
    pub fn new(id: ProcessId, max: Vec<Units>, priority: u32) -> Self {
        let allocation = vec![0; max.len()];
        let need = max.clone();
        Self {
            id,
            max,
            allocation,
            need,
            status: ProcessStatus::Active,
            priority,
            start_time: unix_now(),
            end_time: None,
            wait_time: 0,
            cpu_usage: 0.0,
        }
    }

    /// Whether the process still competes for resources.
    pub fn is_active(&self) -> bool {
        self.status == ProcessStatus::Active
    }

    fn sync_need(&mut self) {
        for ((n, &m), &a) in self.need.iter_mut().zip(&self.max).zip(&self.allocation) {
            *n = m - a;
        }
    }
}

/// The shared allocation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    total: Vec<Units>,
    available: Vec<Units>,
    processes: Vec<Process>,
}

impl ResourceState {
    /// Create a state with the given capacity and no processes.
    pub fn new(total: Vec<Units>) -> Self {
        Self {
            available: total.clone(),
            total,
            processes: Vec::new(),
        }
    }

    /// Assemble a state from parts. Callers validate the invariants.
    pub(crate) fn from_parts(
        total: Vec<Units>,
        available: Vec<Units>,
        processes: Vec<Process>,
    ) -> Self {
        Self {
            total,
            available,
            processes,
        }
    }

    /// Number of resource types.
    pub fn resource_types(&self) -> usize {
        self.total.len()
    }

    /// Fixed capacity per type.
    pub fn total(&self) -> &[Units] {
        &self.total
    }

    /// Units currently unallocated per type.
    pub fn available(&self) -> &[Units] {
        &self.available
    }

    /// The full process table, completed processes included, in id order.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Look up a process.
    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(pid.0)
    }

    pub(crate) fn process_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(pid.0)
    }

    /// Ids of active processes in ascending order.
    pub fn active_ids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.processes
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.id)
    }

    /// Units of type `j` held across all processes, saturating at the
    /// `Units` bounds.
    pub fn allocated(&self, j: usize) -> Units {
        let sum = self.allocated_wide(j);
        Units::try_from(sum).unwrap_or(if sum < 0 { Units::MIN } else { Units::MAX })
    }

    fn allocated_wide(&self, j: usize) -> i128 {
        self.processes
            .iter()
            .map(|p| p.allocation.get(j).copied().map_or(0, i128::from))
            .sum()
    }

    /// `available[j] + Σ allocation[i][j] == total[j]` for every type.
    ///
    /// Summed in `i128`, so decoded input near the `Units` bounds cannot
    /// overflow.
    pub fn is_conserved(&self) -> bool {
        self.available.len() == self.total.len()
            && (0..self.total.len()).all(|j| {
                let held = self.allocated_wide(j);
                i128::from(self.available[j]) + held == i128::from(self.total[j])
            })
    }

    /// `0 <= allocation <= max` and `need == max - allocation` for every process.
    pub fn is_feasible(&self) -> bool {
        let m = self.total.len();
        self.available.iter().all(|&a| a >= 0)
            && self.processes.iter().enumerate().all(|(i, p)| {
                p.id == ProcessId(i)
                    && p.max.len() == m
                    && p.allocation.len() == m
                    && p.need.len() == m
                    && (0..m).all(|j| {
                        p.allocation[j] >= 0
                            && p.allocation[j] <= p.max[j]
                            && p.need[j] == p.max[j] - p.allocation[j]
                    })
            })
    }

    /// Check a pid and a request/release vector at the API boundary.
    pub fn validate(&self, pid: ProcessId, vector: &[Units]) -> Result<&Process, AllocError> {
        let process = self
            .process(pid)
            .ok_or_else(|| AllocError::invalid(format!("unknown process id {}", pid.0)))?;
        self.validate_vector(vector)?;
        Ok(process)
    }

    /// Check length and sign of a resource vector.
    pub fn validate_vector(&self, vector: &[Units]) -> Result<(), AllocError> {
        if vector.len() != self.resource_types() {
            return Err(AllocError::invalid(format!(
                "expected {} resource types, got {}",
                self.resource_types(),
                vector.len()
            )));
        }
        if let Some(j) = vector.iter().position(|&v| v < 0) {
            return Err(AllocError::invalid(format!("negative value for R{j}")));
        }
        Ok(())
    }

    /// Append an active process with a uniform per-type ceiling.
    pub(crate) fn push_process(&mut self, max_per_type: Units, priority: u32) -> &mut Process {
        let id = ProcessId(self.processes.len());
        let max = vec![max_per_type; self.resource_types()];
        self.processes.push(Process::new(id, max, priority));
        &mut self.processes[id.0]
    }

    /// Move `units` from available to the process. Callers check admissibility.
    pub(crate) fn grant(&mut self, pid: ProcessId, units: &[Units]) {
        let Some(process) = self.processes.get_mut(pid.0) else {
            return;
        };
        for (j, &u) in units.iter().enumerate() {
            self.available[j] -= u;
            process.allocation[j] += u;
        }
        process.sync_need();
    }

    /// Move `units` from the process back to available. Callers check bounds.
    pub(crate) fn release(&mut self, pid: ProcessId, units: &[Units]) {
        let Some(process) = self.processes.get_mut(pid.0) else {
            return;
        };
        for (j, &u) in units.iter().enumerate() {
            self.available[j] += u;
            process.allocation[j] -= u;
        }
        process.sync_need();
    }

    /// Reclaim everything a process holds and mark it completed.
    /// Returns the reclaimed vector.
    pub(crate) fn retire(&mut self, pid: ProcessId) -> Vec<Units> {
        let Some(process) = self.processes.get(pid.0) else {
            return Vec::new();
        };
        let held = process.allocation.clone();
        self.release(pid, &held);
        if let Some(process) = self.processes.get_mut(pid.0) {
            process.status = ProcessStatus::Completed;
            process.end_time = Some(unix_now());
        }
        held
    }

    /// Percentage of each type currently allocated.
    pub fn utilization(&self) -> Vec<f64> {
        (0..self.total.len())
            .map(|j| {
                if self.total[j] == 0 {
                    0.0
                } else {
                    self.allocated(j) as f64 / self.total[j] as f64 * 100.0
                }
            })
            .collect()
    }

    /// Active ids ordered by priority, lowest first, ties by id.
    pub fn priority_order(&self) -> Vec<ProcessId> {
        let mut ids: Vec<(u32, ProcessId)> = self
            .processes
            .iter()
            .filter(|p| p.is_active())
            .map(|p| (p.priority, p.id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

/// Seconds since the Unix epoch; 0 if the clock is before it.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
