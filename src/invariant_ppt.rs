//! PPT Invariant System: runtime invariant enforcement with contract tracking.
//!
//! A failed invariant is a programming error (a lock was bypassed or a
//! commit was torn) and panics. Passing checks are logged so contract tests
//! can prove a code path actually enforced what it claims.

#[cfg(feature = "ppt")]
use lazy_static::lazy_static;
#[cfg(feature = "ppt")]
use parking_lot::Mutex;
#[cfg(feature = "ppt")]
use std::collections::HashSet;

// Invariant constants for contract tracking.
pub const STATE_CONSERVATION: u32 = 1;
pub const STATE_FEASIBILITY: u32 = 2;
pub const SAFETY_GATE: u32 = 3;
pub const DENIAL_IDEMPOTENT: u32 = 4;
pub const LEDGER_CHAIN_LINK: u32 = 5;
pub const LEDGER_APPEND_ORDER: u32 = 6;
pub const WAIT_GRAPH_ACTIVE_ONLY: u32 = 7;
pub const SIM_REQUEST_BOUNDED: u32 = 8;
pub const SIM_SINGLE_DRIVER: u32 = 9;
pub const SNAPSHOT_INTEGRITY: u32 = 10;
pub const RETIRE_RECLAIMS_ALL: u32 = 11;

#[cfg(feature = "ppt")]
lazy_static! {
    static ref INVARIANT_LOG: Mutex<HashSet<u32>> = Mutex::new(HashSet::new());
}

#[cfg(feature = "ppt")]
/// Assert an invariant: logs it and panics on failure.
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, context: Option<&str>) {
    if !condition {
        let name = invariant_name(id);
        let full_message = if let Some(ctx) = context {
            format!("Invariant {} {} failed: {} (context: {})", id, name, message, ctx)
        } else {
            format!("Invariant {} {} failed: {}", id, name, message)
        };
        tracing::error!(invariant = id, "{}", full_message);
        panic!("{}", full_message);
    }
    INVARIANT_LOG.lock().insert(id);
}

#[cfg(not(feature = "ppt"))]
/// Assert an invariant: checks condition and panics on failure.
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, _context: Option<&str>) {
    if !condition {
        panic!("Invariant {} failed: {}", invariant_name(id), message);
    }
}

#[cfg(feature = "ppt")]
/// Contract test: checks that specified invariants were asserted.
pub fn contract_test(test_name: &str, required_invariants: &[u32]) {
    let log = INVARIANT_LOG.lock();
    let missing: Vec<u32> = required_invariants
        .iter()
        .copied()
        .filter(|inv| !log.contains(inv))
        .collect();
    drop(log); // Drop the lock before panicking
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|&id| invariant_name(id)).collect();
        panic!(
            "Contract test '{}' failed: invariants not enforced: {:?}",
            test_name, names
        );
    }
}

#[cfg(not(feature = "ppt"))]
/// Contract test: no-op when PPT feature is disabled.
pub fn contract_test(_test_name: &str, _required_invariants: &[u32]) {}

#[cfg(feature = "ppt")]
/// Clear invariant log (for between test runs).
pub fn clear_invariant_log() {
    INVARIANT_LOG.lock().clear();
}

#[cfg(not(feature = "ppt"))]
/// Clear invariant log: no-op when PPT feature is disabled.
pub fn clear_invariant_log() {}

/// Human-readable name of an invariant id (diagnostics only).
pub const fn invariant_name(id: u32) -> &'static str {
    match id {
        STATE_CONSERVATION => "STATE_CONSERVATION",
        STATE_FEASIBILITY => "STATE_FEASIBILITY",
        SAFETY_GATE => "SAFETY_GATE",
        DENIAL_IDEMPOTENT => "DENIAL_IDEMPOTENT",
        LEDGER_CHAIN_LINK => "LEDGER_CHAIN_LINK",
        LEDGER_APPEND_ORDER => "LEDGER_APPEND_ORDER",
        WAIT_GRAPH_ACTIVE_ONLY => "WAIT_GRAPH_ACTIVE_ONLY",
        SIM_REQUEST_BOUNDED => "SIM_REQUEST_BOUNDED",
        SIM_SINGLE_DRIVER => "SIM_SINGLE_DRIVER",
        SNAPSHOT_INTEGRITY => "SNAPSHOT_INTEGRITY",
        RETIRE_RECLAIMS_ALL => "RETIRE_RECLAIMS_ALL",
        _ => "UNKNOWN",
    }
}
