//! Versioned state store with optimistic concurrency.
//!
//! Each key owns an append-only history of [`StateEntry`] values. Writes are
//! fenced on the version the caller last read; a stale version is rejected
//! with [`StateError::Conflict`] and never retried here. Callers retry with
//! [`retry::retry_on_conflict`] after re-reading.

pub mod entry;
pub mod hooks;
pub mod retry;
pub mod store;

pub use entry::{
    diff_snapshots, snapshot_fingerprint, DiffOperation, StateConflict, StateDiff, StateEntry,
    StateSnapshot,
};
pub use hooks::{StateChange, StateChangeHook};
pub use retry::{retry_on_conflict, RetryPolicy};
pub use store::VersionedStateStore;

/// Errors produced by state store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("key already exists: {key}")]
    AlreadyExists { key: String },

    #[error("version conflict on {key}: expected {expected_version}, actual {actual_version}")]
    Conflict {
        key: String,
        expected_version: u64,
        actual_version: u64,
    },
}

/// Result type for state store operations.
pub type StateResult<T> = std::result::Result<T, StateError>;
