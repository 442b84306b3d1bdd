//! Deadlock-avoidant resource allocation kernel.
//!
//! [`BankerSystem`] ties together the allocation [`Coordinator`] and the
//! background [`Simulation`] driver over one shared state.

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod deadlock;
pub mod error;
#[doc(hidden)]
pub mod harness;
pub mod history;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod ledger;
pub mod safety;
pub mod simulation;
pub mod snapshot;
pub mod state;

pub use builder::SystemBuilder;
pub use config::{SimulationConfig, SystemConfig};
pub use coordinator::{Coordinator, Decision, DenyReason, Resolution, SimulationStats};
pub use deadlock::DeadlockReport;
pub use error::{AllocError, BuildError, ConfigError, IntegrityError, IntegrityFault, SnapshotError};
pub use safety::SafetyReport;
pub use simulation::Simulation;
pub use snapshot::Snapshot;
pub use state::{Process, ProcessId, ProcessStatus, ResourceState, Units};

use std::sync::Arc;

/// The whole system: coordinator plus its simulation driver.
pub struct BankerSystem {
    coordinator: Arc<Coordinator>,
    simulation: Simulation,
}

impl BankerSystem {
    /// Wrap an initial state; the driver uses default pacing.
    pub fn new(state: ResourceState) -> Self {
        Self::with_simulation(Coordinator::new(state), SimulationConfig::default())
    }

    /// Build the default initial state described by `config`.
    pub fn from_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_simulation(
            Coordinator::from_config(config),
            config.simulation.clone(),
        ))
    }

    fn with_simulation(coordinator: Coordinator, config: SimulationConfig) -> Self {
        let coordinator = Arc::new(coordinator);
        let simulation = Simulation::new(Arc::clone(&coordinator), config);
        Self {
            coordinator,
            simulation,
        }
    }

    /// Shared coordinator, for callers on other threads.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// See [`Coordinator::request`].
    pub fn request(&self, pid: ProcessId, request: &[Units]) -> Result<Decision, AllocError> {
        self.coordinator.request(pid, request)
    }

    /// See [`Coordinator::force_grant`].
    pub fn force_grant(&self, pid: ProcessId, request: &[Units]) -> Result<Decision, AllocError> {
        self.coordinator.force_grant(pid, request)
    }

    /// See [`Coordinator::release`].
    pub fn release(&self, pid: ProcessId, release: &[Units]) -> Result<(), AllocError> {
        self.coordinator.release(pid, release)
    }

    /// See [`Coordinator::add_process`].
    pub fn add_process(&self, max_per_type: Units, priority: u32) -> Result<ProcessId, AllocError> {
        self.coordinator.add_process(max_per_type, priority)
    }

    /// See [`Coordinator::remove_process`].
    pub fn remove_process(&self, pid: ProcessId) -> Result<Vec<Units>, AllocError> {
        self.coordinator.remove_process(pid)
    }

    pub fn check_safe(&self) -> SafetyReport {
        self.coordinator.check_safe()
    }

    pub fn detect_deadlock(&self) -> DeadlockReport {
        self.coordinator.detect_deadlock()
    }

    pub fn resolve_deadlock(&self) -> Option<Resolution> {
        self.coordinator.resolve_deadlock()
    }

    pub fn verify_ledger(&self) -> Result<(), IntegrityError> {
        self.coordinator.verify_ledger()
    }

    /// Active ids by priority, lowest first.
    pub fn priority_order(&self) -> Vec<ProcessId> {
        self.coordinator.with_state(ResourceState::priority_order)
    }

    /// Percentage of each type allocated.
    pub fn utilization(&self) -> Vec<f64> {
        self.coordinator.with_state(ResourceState::utilization)
    }

    pub fn stats(&self) -> SimulationStats {
        self.coordinator.stats()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.coordinator.snapshot()
    }

    pub fn restore(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        self.coordinator.restore(snapshot)
    }

    /// Start the driver. `Ok(false)` if it was already running.
    pub fn start_simulation(&self) -> std::io::Result<bool> {
        self.simulation.start()
    }

    /// Stop the driver. `false` if it was not running.
    pub fn stop_simulation(&self) -> bool {
        self.simulation.stop()
    }

    pub fn is_simulation_running(&self) -> bool {
        self.simulation.is_running()
    }
}
