//! Proof harness: shared fixtures and an independent safety replay.

use crate::builder::SystemBuilder;
use crate::safety::fits;
use crate::state::{ProcessId, ResourceState};

/// Five processes over four types with safe order P3, P1, P0, P2, P4.
pub fn textbook_state() -> ResourceState {
    let built = SystemBuilder::new(vec![10, 5, 7, 6])
        .process(vec![7, 5, 3, 2], vec![0, 1, 0, 0], 3)
        .process(vec![3, 2, 2, 4], vec![2, 0, 0, 1], 2)
        .process(vec![9, 0, 2, 1], vec![3, 0, 2, 1], 4)
        .process(vec![2, 2, 2, 1], vec![2, 1, 1, 1], 1)
        .process(vec![4, 3, 3, 1], vec![0, 0, 2, 1], 5)
        .build();
    match built {
        Ok(state) => state,
        Err(err) => panic!("textbook fixture is consistent: {err}"),
    }
}

/// Two processes, each holding what the other needs; nothing available.
/// P1 has the lower priority.
pub fn mutual_wait_state() -> ResourceState {
    let built = SystemBuilder::new(vec![1, 1, 1, 1])
        .process(vec![1, 1, 1, 0], vec![1, 0, 1, 0], 2)
        .process(vec![1, 1, 0, 1], vec![0, 1, 0, 1], 1)
        .build();
    match built {
        Ok(state) => state,
        Err(err) => panic!("mutual-wait fixture is consistent: {err}"),
    }
}

/// Replay `sequence` against `state`: every step must fit the running
/// work vector, and every active process must appear exactly once.
pub fn replay_sequence(state: &ResourceState, sequence: &[ProcessId]) -> bool {
    let active: Vec<ProcessId> = state.active_ids().collect();
    if sequence.len() != active.len() {
        return false;
    }
    let mut seen = vec![false; state.processes().len()];
    let mut work = state.available().to_vec();
    for &pid in sequence {
        let Some(process) = state.process(pid) else {
            return false;
        };
        if !process.is_active() || seen[pid.0] || !fits(&process.need, &work) {
            return false;
        }
        seen[pid.0] = true;
        for (w, &a) in work.iter_mut().zip(&process.allocation) {
            *w += a;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_accepts_known_order() {
        let state = textbook_state();
        let order: Vec<ProcessId> = [3, 1, 0, 2, 4].into_iter().map(ProcessId).collect();
        assert!(replay_sequence(&state, &order));
    }

    #[test]
    fn replay_rejects_bad_orders() {
        let state = textbook_state();
        // P0 needs 7 of R0 with only 3 available.
        let order: Vec<ProcessId> = [0, 3, 1, 2, 4].into_iter().map(ProcessId).collect();
        assert!(!replay_sequence(&state, &order));
        let short: Vec<ProcessId> = [3, 1].into_iter().map(ProcessId).collect();
        assert!(!replay_sequence(&state, &short));
        let repeated: Vec<ProcessId> = [3, 3, 1, 0, 2].into_iter().map(ProcessId).collect();
        assert!(!replay_sequence(&state, &repeated));
    }

    #[test]
    fn mutual_wait_has_nothing_available() {
        assert_eq!(mutual_wait_state().available(), &[0, 0, 0, 0]);
    }
}
