//! Safety module: Banker's safe-state check over a state snapshot.

use crate::state::{Process, ProcessId, ResourceState, Units};

/// Outcome of a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyReport {
    /// Every active process can finish.
    pub safe: bool,
    /// A completion order. Complete when `safe`, a prefix otherwise.
    pub sequence: Vec<ProcessId>,
}

/// Check a whole state.
pub fn check(state: &ResourceState) -> SafetyReport {
    is_safe(state.processes(), state.available())
}

/// Search for a completion order.
///
/// Repeatedly takes the lowest-id unfinished active process whose need fits
/// in `work`, returns its allocation to `work` and rescans from the start.
/// Reads its inputs only; completed processes are ignored. Zero active
/// processes is trivially safe. O(n²·m).
pub fn is_safe(processes: &[Process], available: &[Units]) -> SafetyReport {
    let mut work = available.to_vec();
    let mut finish: Vec<bool> = processes.iter().map(|p| !p.is_active()).collect();
    let mut sequence = Vec::with_capacity(processes.len());

    while let Some(i) = next_runnable(processes, &finish, &work) {
        for (w, &a) in work.iter_mut().zip(&processes[i].allocation) {
            *w += a;
        }
        finish[i] = true;
        sequence.push(processes[i].id);
    }

    SafetyReport {
        safe: finish.iter().all(|&f| f),
        sequence,
    }
}

fn next_runnable(processes: &[Process], finish: &[bool], work: &[Units]) -> Option<usize> {
    processes
        .iter()
        .enumerate()
        .find(|(i, p)| !finish[*i] && fits(&p.need, work))
        .map(|(i, _)| i)
}

/// Component-wise `need <= work`.
pub fn fits(need: &[Units], work: &[Units]) -> bool {
    need.iter().zip(work).all(|(n, w)| n <= w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SystemBuilder;

    fn textbook() -> ResourceState {
        SystemBuilder::new(vec![10, 5, 7, 6])
            .process(vec![7, 5, 3, 2], vec![0, 1, 0, 0], 3)
            .process(vec![3, 2, 2, 4], vec![2, 0, 0, 1], 2)
            .process(vec![9, 0, 2, 1], vec![3, 0, 2, 1], 4)
            .process(vec![2, 2, 2, 1], vec![2, 1, 1, 1], 1)
            .process(vec![4, 3, 3, 1], vec![0, 0, 2, 1], 5)
            .build()
            .unwrap()
    }

    #[test]
    fn safety_textbook_sequence() {
        let report = check(&textbook());
        assert!(report.safe);
        assert_eq!(
            report.sequence,
            vec![ProcessId(3), ProcessId(1), ProcessId(0), ProcessId(2), ProcessId(4)]
        );
    }

    #[test]
    fn safety_empty_is_safe() {
        let state = ResourceState::new(vec![1, 2]);
        let report = check(&state);
        assert!(report.safe);
        assert!(report.sequence.is_empty());
    }

    #[test]
    fn safety_skips_completed() {
        let mut state = textbook();
        for pid in 0..5 {
            state.retire(ProcessId(pid));
        }
        let report = check(&state);
        assert!(report.safe);
        assert!(report.sequence.is_empty());
    }

    #[test]
    fn safety_does_not_mutate_input() {
        let state = textbook();
        let before = state.clone();
        let _ = check(&state);
        assert_eq!(state, before);
    }

    #[test]
    fn safety_unsafe_reports_prefix() {
        // P0 can finish, P1 then needs 3 of R0 with only 2 free.
        let state = SystemBuilder::new(vec![3])
            .process(vec![1], vec![0], 1)
            .process(vec![4], vec![1], 1)
            .build()
            .unwrap();
        let report = check(&state);
        assert!(!report.safe);
        assert_eq!(report.sequence, vec![ProcessId(0)]);
    }
}
