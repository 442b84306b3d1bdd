//! Error types for the allocation kernel.
//!
//! Denials (`InsufficientResources`, `UnsafeState`) are decisions, not errors,
//! and live in [`crate::coordinator::Decision`].

use crate::state::ProcessId;
use thiserror::Error;

/// Errors returned by the allocation protocol. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// Malformed pid, wrong-length vector or negative component.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input.
        reason: String,
    },
    /// Unknown or already-completed process.
    #[error("invalid or already completed process {0}")]
    InvalidProcess(ProcessId),
    /// A release asked for more than the process currently holds.
    #[error("{pid} cannot release {requested} units of R{resource}: holds {held}")]
    ExceedsAllocation {
        /// Releasing process.
        pid: ProcessId,
        /// Resource type index.
        resource: usize,
        /// Units asked back.
        requested: i64,
        /// Units currently held.
        held: i64,
    },
}

impl AllocError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        AllocError::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// Errors raised while assembling an initial [`crate::state::ResourceState`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A vector did not have one entry per resource type.
    #[error("process {index}: expected {expected} resource types, got {got}")]
    LengthMismatch {
        /// Position of the process in the builder.
        index: usize,
        /// Resource type count.
        expected: usize,
        /// Length supplied.
        got: usize,
    },
    /// A negative total, maximum or allocation.
    #[error("negative value in {what}")]
    NegativeValue {
        /// Which vector held it.
        what: &'static str,
    },
    /// Allocation above the declared maximum.
    #[error("process {index}: allocation exceeds max for R{resource}")]
    AllocationExceedsMax {
        /// Position of the process in the builder.
        index: usize,
        /// Resource type index.
        resource: usize,
    },
    /// Allocations sum to more than the total for a type.
    #[error("R{resource} over-allocated: {allocated} of {total}")]
    OverAllocated {
        /// Resource type index.
        resource: usize,
        /// Sum of allocations.
        allocated: i64,
        /// Capacity.
        total: i64,
    },
}

/// Kind of ledger corruption found by verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFault {
    /// `previous_hash` does not match the prior block's hash.
    BrokenLink,
    /// Stored hash does not match the recomputed digest.
    DigestMismatch,
    /// Block index is out of sequence.
    IndexGap,
}

/// First bad block found while walking the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ledger block {index} failed verification: {fault:?}")]
pub struct IntegrityError {
    /// Index of the first block that failed.
    pub index: usize,
    /// What failed.
    pub fault: IntegrityFault,
}

/// Errors at the snapshot export/import boundary.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The JSON could not be encoded or decoded.
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    /// Schema version this build does not understand.
    #[error("unsupported snapshot schema version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version in the document.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
    /// The decoded state breaks a state invariant.
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
    /// The embedded ledger does not verify.
    #[error(transparent)]
    Ledger(#[from] IntegrityError),
}

/// Errors loading a [`crate::config::SystemConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML syntax or type error.
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
    /// Parsed but semantically invalid.
    #[error("invalid config: {0}")]
    Invalid(String),
}
