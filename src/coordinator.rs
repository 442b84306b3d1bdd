//! Allocation coordinator: the request/release protocol.
//!
//! Every mutation runs under one mutex that also guards the ledger, so the
//! tentative-apply / safety-check / commit sequence is atomic and ledger
//! blocks appear in commit order.

use crate::config::SystemConfig;
use crate::deadlock::{self, DeadlockReport};
use crate::error::{AllocError, IntegrityError, SnapshotError};
use crate::history::{HistoryAction, HistoryRecord};
use crate::invariant_ppt::{
    assert_invariant, DENIAL_IDEMPOTENT, RETIRE_RECLAIMS_ALL, SAFETY_GATE, SNAPSHOT_INTEGRITY,
    STATE_CONSERVATION, STATE_FEASIBILITY,
};
use crate::ledger::Ledger;
use crate::safety::{self, SafetyReport};
use crate::snapshot::Snapshot;
use crate::state::{Process, ProcessId, ProcessStatus, ResourceState, Units};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a request was not granted. A decision, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Asked for more than the process needs or than is available.
    InsufficientResources,
    /// Granting would leave no safe completion order.
    UnsafeState,
}

/// Outcome of a well-formed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Committed.
    Granted,
    /// Not committed; state untouched apart from the wait counter.
    Denied(DenyReason),
}

impl Decision {
    /// Whether the request was committed.
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }
}

/// A deadlock broken by terminating a victim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Terminated process.
    pub victim: ProcessId,
    /// The cycle that was broken.
    pub cycle: Vec<ProcessId>,
    /// Units returned to available.
    pub reclaimed: Vec<Units>,
}

/// Counters kept alongside the state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Well-formed requests decided, direct or simulated.
    pub requests_processed: u64,
    /// Detection passes that found a cycle.
    pub deadlocks_detected: u64,
    /// Victims terminated.
    pub deadlocks_resolved: u64,
    /// Running mean of request decision time, in microseconds.
    pub avg_response_time_us: f64,
    /// Simulation cycles run, no-op cycles included.
    pub total_cycles: u64,
}

impl SimulationStats {
    fn record_request(&mut self, started: Instant) {
        let micros = started.elapsed().as_secs_f64() * 1_000_000.0;
        self.requests_processed += 1;
        let n = self.requests_processed as f64;
        self.avg_response_time_us += (micros - self.avg_response_time_us) / n;
    }
}

struct Inner {
    state: ResourceState,
    ledger: Ledger,
    history: Vec<HistoryRecord>,
    stats: SimulationStats,
    rng: fastrand::Rng,
}

impl Inner {
    fn check_invariants(&self, context: &str) {
        assert_invariant(
            STATE_CONSERVATION,
            self.state.is_conserved(),
            "available + allocated equals total for every type",
            Some(context),
        );
        assert_invariant(
            STATE_FEASIBILITY,
            self.state.is_feasible(),
            "0 <= allocation <= max and need == max - allocation",
            Some(context),
        );
    }

    fn active(&self, pid: ProcessId, vector: &[Units]) -> Result<&Process, AllocError> {
        let process = self.state.validate(pid, vector)?;
        if !process.is_active() {
            return Err(AllocError::InvalidProcess(pid));
        }
        Ok(process)
    }

    fn bump_wait(&mut self, pid: ProcessId) {
        if let Some(p) = self.state.process_mut(pid) {
            p.wait_time += 1;
        }
    }

    fn retire(&mut self, pid: ProcessId) -> Vec<Units> {
        let reclaimed = self.state.retire(pid);
        assert_invariant(
            RETIRE_RECLAIMS_ALL,
            self.state
                .process(pid)
                .is_some_and(|p| p.allocation.iter().all(|&a| a == 0)),
            "Retired process holds nothing",
            Some("retire"),
        );
        if reclaimed.iter().any(|&u| u > 0) {
            self.history
                .push(HistoryRecord::now(pid, reclaimed.clone(), HistoryAction::Release));
        }
        reclaimed
    }
}

/// Owns the shared state and serializes every mutation.
pub struct Coordinator {
    inner: Mutex<Inner>,
}

impl Coordinator {
    /// Wrap an initial state with a fresh ledger.
    pub fn new(state: ResourceState) -> Self {
        Self::with_rng(state, fastrand::Rng::new())
    }

    /// Like [`Coordinator::new`] with a seeded RNG for CPU-usage samples.
    pub fn with_rng(state: ResourceState, rng: fastrand::Rng) -> Self {
        let inner = Inner {
            state,
            ledger: Ledger::new(),
            history: Vec::new(),
            stats: SimulationStats::default(),
            rng,
        };
        inner.check_invariants("init");
        info!(
            processes = inner.state.processes().len(),
            resource_types = inner.state.resource_types(),
            "coordinator initialized"
        );
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Default initial state from configuration.
    pub fn from_config(config: &SystemConfig) -> Self {
        let mut rng = config.rng();
        let state = ResourceState::from_config(config, &mut rng);
        Self::with_rng(state, rng)
    }

    /// Ask for `request` units on behalf of `pid`.
    ///
    /// Grants only if the request fits the process's need and current
    /// availability and the resulting state is safe. Denials leave
    /// available, allocation and need untouched.
    pub fn request(&self, pid: ProcessId, request: &[Units]) -> Result<Decision, AllocError> {
        let started = Instant::now();
        let mut inner = self.inner.lock();

        if let Err(err) = inner.active(pid, request) {
            warn!(%pid, %err, "request rejected");
            return Err(err);
        }
        let before = footprint(&inner.state);
        let decision = if !admissible(&inner.state, pid, request) {
            Decision::Denied(DenyReason::InsufficientResources)
        } else {
            let mut tentative = inner.state.clone();
            tentative.grant(pid, request);
            let report = safety::check(&tentative);
            debug!(%pid, safe = report.safe, sequence = ?report.sequence, "safety gate");
            if report.safe {
                assert_invariant(
                    SAFETY_GATE,
                    report.sequence.len() == tentative.active_ids().count(),
                    "Committed state has a complete completion order",
                    Some("request"),
                );
                inner.state = tentative;
                Decision::Granted
            } else {
                Decision::Denied(DenyReason::UnsafeState)
            }
        };

        match decision {
            Decision::Granted => {
                inner.check_invariants("request");
                inner.ledger.append(format!("{pid} allocated resources"));
                inner
                    .history
                    .push(HistoryRecord::now(pid, request.to_vec(), HistoryAction::Allocate));
                info!(%pid, ?request, "request granted");
            }
            Decision::Denied(reason) => {
                inner.bump_wait(pid);
                assert_invariant(
                    DENIAL_IDEMPOTENT,
                    footprint(&inner.state) == before,
                    "Denied request leaves available, allocation and need untouched",
                    Some("request"),
                );
                warn!(%pid, ?request, ?reason, "request denied");
            }
        }
        inner.stats.record_request(started);
        Ok(decision)
    }

    /// Grant `request` without the safety gate.
    ///
    /// Input validation and admissibility still apply. The resulting state
    /// may be unsafe; this is how deadlock scenarios are staged.
    pub fn force_grant(&self, pid: ProcessId, request: &[Units]) -> Result<Decision, AllocError> {
        let mut inner = self.inner.lock();
        inner.active(pid, request).inspect_err(|err| {
            warn!(%pid, %err, "force grant rejected");
        })?;
        if !admissible(&inner.state, pid, request) {
            inner.bump_wait(pid);
            warn!(%pid, ?request, "force grant denied: insufficient resources");
            return Ok(Decision::Denied(DenyReason::InsufficientResources));
        }
        inner.state.grant(pid, request);
        inner.check_invariants("force_grant");
        inner.ledger.append(format!("{pid} force-allocated resources"));
        inner
            .history
            .push(HistoryRecord::now(pid, request.to_vec(), HistoryAction::Allocate));
        warn!(%pid, ?request, "request force-granted without safety check");
        Ok(Decision::Granted)
    }

    /// Return `release` units from `pid` to the pool.
    pub fn release(&self, pid: ProcessId, release: &[Units]) -> Result<(), AllocError> {
        let mut inner = self.inner.lock();
        let process = inner.active(pid, release).inspect_err(|err| {
            warn!(%pid, %err, "release rejected");
        })?;
        if let Some((resource, (&requested, &held))) = release
            .iter()
            .zip(&process.allocation)
            .enumerate()
            .find(|(_, (r, h))| r > h)
        {
            let err = AllocError::ExceedsAllocation {
                pid,
                resource,
                requested,
                held,
            };
            warn!(%pid, %err, "release rejected");
            return Err(err);
        }

        inner.state.release(pid, release);
        inner.check_invariants("release");
        inner.ledger.append(format!("{pid} released resources"));
        inner
            .history
            .push(HistoryRecord::now(pid, release.to_vec(), HistoryAction::Release));
        info!(%pid, ?release, "resources released");
        Ok(())
    }

    /// Add an active process with the same ceiling for every type.
    pub fn add_process(&self, max_per_type: Units, priority: u32) -> Result<ProcessId, AllocError> {
        if max_per_type < 0 {
            let err = AllocError::invalid("negative max resources");
            warn!(max_per_type, %err, "add process rejected");
            return Err(err);
        }
        let mut inner = self.inner.lock();
        let cpu_usage = crate::builder::sample_cpu_usage(&mut inner.rng);
        let process = inner.state.push_process(max_per_type, priority);
        process.cpu_usage = cpu_usage;
        let pid = process.id;
        inner.check_invariants("add_process");
        inner.ledger.append(format!("Added process {pid}"));
        info!(%pid, max_per_type, priority, "process added");
        Ok(pid)
    }

    /// Complete an active process, reclaiming everything it holds.
    pub fn remove_process(&self, pid: ProcessId) -> Result<Vec<Units>, AllocError> {
        let mut inner = self.inner.lock();
        match inner.state.process(pid) {
            Some(p) if p.status == ProcessStatus::Active => {}
            _ => {
                warn!(%pid, "remove rejected: invalid or already completed");
                return Err(AllocError::InvalidProcess(pid));
            }
        }
        let reclaimed = inner.retire(pid);
        inner.check_invariants("remove_process");
        inner.ledger.append(format!("Removed process {pid}"));
        info!(%pid, ?reclaimed, "process removed");
        Ok(reclaimed)
    }

    /// Safety check of the current state.
    pub fn check_safe(&self) -> SafetyReport {
        safety::check(&self.inner.lock().state)
    }

    /// Wait-for cycle search over a consistent snapshot.
    pub fn detect_deadlock(&self) -> DeadlockReport {
        let mut inner = self.inner.lock();
        let report = deadlock::detect(&inner.state);
        if let Some(cycle) = &report.cycle {
            inner.stats.deadlocks_detected += 1;
            warn!(?cycle, "deadlock cycle detected");
        }
        report
    }

    /// Break one detected cycle by terminating its lowest-priority member.
    /// `None` when no cycle exists; nothing changes then.
    pub fn resolve_deadlock(&self) -> Option<Resolution> {
        let mut inner = self.inner.lock();
        let cycle = deadlock::detect(&inner.state).cycle?;
        inner.stats.deadlocks_detected += 1;
        let victim = deadlock::select_victim(&inner.state, &cycle)?;

        let reclaimed = inner.retire(victim);
        inner.check_invariants("resolve_deadlock");
        inner
            .ledger
            .append(format!("Deadlock resolution: terminated {victim}"));
        inner.stats.deadlocks_resolved += 1;
        warn!(%victim, ?cycle, ?reclaimed, "deadlock resolved by terminating victim");
        Some(Resolution {
            victim,
            cycle,
            reclaimed,
        })
    }

    /// Walk the ledger chain.
    pub fn verify_ledger(&self) -> Result<(), IntegrityError> {
        let result = self.inner.lock().ledger.verify_integrity();
        if let Err(err) = &result {
            warn!(%err, "ledger verification failed");
        }
        result
    }

    /// Read the state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&ResourceState) -> R) -> R {
        f(&self.inner.lock().state)
    }

    /// Counters.
    pub fn stats(&self) -> SimulationStats {
        self.inner.lock().stats.clone()
    }

    pub(crate) fn record_cycle(&self) {
        self.inner.lock().stats.total_cycles += 1;
    }

    /// Consistent copy of state, ledger, history and counters.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot::new(
            inner.state.clone(),
            inner.ledger.blocks().to_vec(),
            inner.history.clone(),
            inner.stats.clone(),
        )
    }

    /// Replace state and history from a validated snapshot.
    ///
    /// The live ledger is kept and records the restore.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;
        let mut inner = self.inner.lock();
        inner.state = snapshot.state.clone();
        inner.history = snapshot.history.clone();
        inner.check_invariants("restore");
        inner.ledger.append("State restored from snapshot");
        assert_invariant(
            SNAPSHOT_INTEGRITY,
            inner.ledger.verify_integrity().is_ok(),
            "Live ledger still verifies after restore",
            Some("restore"),
        );
        info!(
            processes = inner.state.processes().len(),
            "state restored from snapshot"
        );
        Ok(())
    }
}

/// The parts of a state a denial must not change.
fn footprint(state: &ResourceState) -> (Vec<Units>, Vec<(Vec<Units>, Vec<Units>)>) {
    let holdings = state
        .processes()
        .iter()
        .map(|p| (p.allocation.clone(), p.need.clone()))
        .collect();
    (state.available().to_vec(), holdings)
}

/// Every component within the process's need and current availability.
fn admissible(state: &ResourceState, pid: ProcessId, request: &[Units]) -> bool {
    let Some(process) = state.process(pid) else {
        return false;
    };
    request
        .iter()
        .enumerate()
        .all(|(j, &r)| r <= process.need[j] && r <= state.available()[j])
}
