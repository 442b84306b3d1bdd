//! End-to-end allocation scenarios over the textbook and mutual-wait setups.

use bankers::harness::{mutual_wait_state, replay_sequence, textbook_state};
use bankers::{
    AllocError, BankerSystem, Decision, DenyReason, ProcessId, ProcessStatus, SystemBuilder,
};

#[test]
fn scenario_textbook_state_is_safe() {
    let system = BankerSystem::new(textbook_state());
    let report = system.check_safe();
    assert!(report.safe);
    assert_eq!(report.sequence.len(), 5);
    system
        .coordinator()
        .with_state(|s| assert!(replay_sequence(s, &report.sequence)));
}

#[test]
fn scenario_unsafe_request_is_denied_without_change() {
    let system = BankerSystem::new(textbook_state());
    let before = system.snapshot();

    let decision = system.request(ProcessId(1), &[1, 0, 2, 0]).unwrap();
    assert_eq!(decision, Decision::Denied(DenyReason::UnsafeState));

    let after = system.snapshot();
    assert_eq!(after.state.available(), before.state.available());
    for (a, b) in after.state.processes().iter().zip(before.state.processes()) {
        assert_eq!(a.allocation, b.allocation);
        assert_eq!(a.need, b.need);
    }
    assert_eq!(after.state.process(ProcessId(1)).unwrap().wait_time, 1);
    assert_eq!(after.ledger.len(), before.ledger.len());
    assert!(system.check_safe().safe);
}

#[test]
fn scenario_safe_request_is_granted() {
    let system = BankerSystem::new(textbook_state());
    // P3 can always finish first; topping it up keeps the order intact.
    assert!(system.request(ProcessId(3), &[0, 1, 1, 0]).unwrap().is_granted());
    system.coordinator().with_state(|s| {
        assert_eq!(s.available(), &[3, 2, 1, 2]);
        assert_eq!(s.process(ProcessId(3)).unwrap().need, vec![0, 0, 0, 0]);
    });
    assert!(system.check_safe().safe);
    assert_eq!(
        system.snapshot().ledger.last().unwrap().transaction,
        "P3 allocated resources"
    );
}

#[test]
fn scenario_mutual_wait_is_detected_and_resolved() {
    let system = BankerSystem::new(mutual_wait_state());
    let report = system.detect_deadlock();
    let cycle = report.cycle.expect("cycle");
    assert!(cycle.contains(&ProcessId(0)));
    assert!(cycle.contains(&ProcessId(1)));
    assert_eq!(system.stats().deadlocks_detected, 1);

    let resolution = system.resolve_deadlock().expect("resolution");
    assert_eq!(resolution.victim, ProcessId(1));
    assert_eq!(resolution.reclaimed, vec![0, 1, 0, 1]);

    system.coordinator().with_state(|s| {
        assert_eq!(s.available(), &[0, 1, 0, 1]);
        let victim = s.process(ProcessId(1)).unwrap();
        assert_eq!(victim.status, ProcessStatus::Completed);
        assert!(victim.end_time.is_some());
        assert_eq!(victim.need, victim.max);
    });
    assert!(!system.detect_deadlock().is_deadlocked());
    assert!(system.check_safe().safe);
    assert_eq!(system.stats().deadlocks_resolved, 1);
    assert_eq!(
        system.snapshot().ledger.last().unwrap().transaction,
        "Deadlock resolution: terminated P1"
    );
    assert!(system.verify_ledger().is_ok());
}

#[test]
fn scenario_force_grant_stages_deadlock() {
    let state = SystemBuilder::new(vec![1, 1, 1, 1])
        .idle_process(vec![1, 1, 1, 0], 2)
        .idle_process(vec![1, 1, 0, 1], 1)
        .build()
        .unwrap();
    let system = BankerSystem::new(state);
    assert!(system.request(ProcessId(0), &[1, 0, 1, 0]).unwrap().is_granted());
    assert_eq!(
        system.request(ProcessId(1), &[0, 1, 0, 1]).unwrap(),
        Decision::Denied(DenyReason::UnsafeState)
    );
    assert!(system.force_grant(ProcessId(1), &[0, 1, 0, 1]).unwrap().is_granted());
    assert!(!system.check_safe().safe);
    assert_eq!(
        system.detect_deadlock().cycle,
        Some(vec![ProcessId(0), ProcessId(1)])
    );
}

#[test]
fn scenario_remove_process_reclaims_exact_allocation() {
    let system = BankerSystem::new(textbook_state());
    let reclaimed = system.remove_process(ProcessId(2)).unwrap();
    assert_eq!(reclaimed, vec![3, 0, 2, 1]);
    system
        .coordinator()
        .with_state(|s| assert_eq!(s.available(), &[6, 3, 4, 3]));

    assert_eq!(
        system.remove_process(ProcessId(2)),
        Err(AllocError::InvalidProcess(ProcessId(2)))
    );
    assert_eq!(
        system.remove_process(ProcessId(42)),
        Err(AllocError::InvalidProcess(ProcessId(42)))
    );
    assert_eq!(
        system.snapshot().ledger.last().unwrap().transaction,
        "Removed process P2"
    );
}

#[test]
fn scenario_zero_active_processes_is_safe() {
    let system = BankerSystem::new(textbook_state());
    for i in 0..5 {
        system.remove_process(ProcessId(i)).unwrap();
    }
    let report = system.check_safe();
    assert!(report.safe);
    assert!(report.sequence.is_empty());
    assert!(!system.detect_deadlock().is_deadlocked());
    system
        .coordinator()
        .with_state(|s| assert_eq!(s.available(), s.total()));
}

#[test]
fn scenario_zero_request_is_granted() {
    let system = BankerSystem::new(textbook_state());
    assert!(system.request(ProcessId(0), &[0, 0, 0, 0]).unwrap().is_granted());
}
