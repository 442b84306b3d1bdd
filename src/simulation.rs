//! Background simulation driver.
//!
//! One worker thread picks a random process each cycle, synthesizes a
//! request bounded by `min(need, available)` per type and submits it
//! through [`Coordinator::request`]. Stop is cooperative: the worker checks
//! the stop signal between cycles and wakes early from its sleep.

use crate::config::SimulationConfig;
use crate::coordinator::{Coordinator, Decision};
use crate::error::AllocError;
use crate::invariant_ppt::{assert_invariant, SIM_REQUEST_BOUNDED, SIM_SINGLE_DRIVER};
use crate::state::{ProcessId, Units};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What one simulation cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The process table is empty.
    Empty,
    /// The picked process has completed; nothing was submitted.
    Skipped(ProcessId),
    /// A request was decided by the coordinator.
    Submitted {
        /// Requesting process.
        pid: ProcessId,
        /// Units asked for.
        request: Vec<Units>,
        /// Grant or denial.
        decision: Decision,
    },
    /// The coordinator rejected the request, e.g. the process completed
    /// between synthesis and submission.
    Rejected {
        /// Requesting process.
        pid: ProcessId,
        /// Why.
        error: AllocError,
    },
}

/// Run a single cycle against `coordinator`.
pub fn run_cycle(coordinator: &Coordinator, rng: &mut fastrand::Rng) -> CycleOutcome {
    coordinator.record_cycle();
    let picked = coordinator.with_state(|state| {
        let n = state.processes().len();
        if n == 0 {
            return None;
        }
        let process = &state.processes()[rng.usize(..n)];
        if !process.is_active() {
            return Some((process.id, None));
        }
        let request: Vec<Units> = process
            .need
            .iter()
            .zip(state.available())
            .map(|(&need, &available)| rng.i64(0..=need.min(available).max(0)))
            .collect();
        assert_invariant(
            SIM_REQUEST_BOUNDED,
            request
                .iter()
                .zip(process.need.iter().zip(state.available()))
                .all(|(&r, (&need, &available))| {
                    r >= 0 && r <= need.max(0) && r <= available.max(0)
                }),
            "Simulated request within [0, min(need, available)]",
            Some("run_cycle"),
        );
        Some((process.id, Some(request)))
    });

    let (pid, request) = match picked {
        None => return CycleOutcome::Empty,
        Some((pid, None)) => {
            debug!(%pid, "simulation picked completed process");
            return CycleOutcome::Skipped(pid);
        }
        Some((pid, Some(request))) => (pid, request),
    };

    debug!(%pid, ?request, "simulation request");
    match coordinator.request(pid, &request) {
        Ok(decision) => CycleOutcome::Submitted {
            pid,
            request,
            decision,
        },
        Err(error) => CycleOutcome::Rejected { pid, error },
    }
}

struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn raise(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    /// Sleep up to `pause`. Returns true once stop has been raised.
    fn wait(&self, pause: Duration) -> bool {
        let deadline = Instant::now() + pause;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

struct Worker {
    stop: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

/// Start/stop handle for the single background driver.
pub struct Simulation {
    coordinator: Arc<Coordinator>,
    config: SimulationConfig,
    worker: Mutex<Option<Worker>>,
}

impl Simulation {
    /// A stopped driver for `coordinator`.
    pub fn new(coordinator: Arc<Coordinator>, config: SimulationConfig) -> Self {
        Self {
            coordinator,
            config,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. Returns `Ok(false)` without side effects if a
    /// worker is already running.
    pub fn start(&self) -> std::io::Result<bool> {
        let mut slot = self.worker.lock();
        if slot.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            warn!("simulation already running");
            return Ok(false);
        }
        if let Some(finished) = slot.take() {
            reap(finished);
        }

        let stop = Arc::new(StopSignal::new());
        let coordinator = Arc::clone(&self.coordinator);
        let config = self.config.clone();
        let signal = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("bankers-simulation".to_string())
            .spawn(move || drive(&coordinator, &config, &signal))?;

        assert_invariant(
            SIM_SINGLE_DRIVER,
            slot.is_none(),
            "At most one simulation worker",
            Some("Simulation::start"),
        );
        *slot = Some(Worker { stop, handle });
        info!(
            min_interval_ms = self.config.min_interval_ms,
            max_interval_ms = self.config.max_interval_ms,
            "simulation started"
        );
        Ok(true)
    }

    /// Signal the worker and wait for its current cycle to finish.
    /// Returns false if nothing was running.
    pub fn stop(&self) -> bool {
        let Some(worker) = self.worker.lock().take() else {
            return false;
        };
        worker.stop.raise();
        reap(worker);
        info!("simulation stopped");
        true
    }

    /// Whether a worker is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reap(worker: Worker) {
    if worker.handle.join().is_err() {
        error!("simulation worker panicked");
    }
}

fn drive(coordinator: &Coordinator, config: &SimulationConfig, stop: &StopSignal) {
    let mut rng = config
        .seed
        .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
    loop {
        let cycle = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_cycle(coordinator, &mut rng)
        }));
        match cycle {
            Ok(outcome) => debug!(?outcome, "simulation cycle"),
            Err(_) => {
                // Fail closed: a broken invariant ends the run.
                error!("simulation cycle panicked; stopping");
                return;
            }
        }
        if stop.wait(config.next_interval(&mut rng)) {
            return;
        }
    }
}
