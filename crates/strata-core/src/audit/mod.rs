//! Tamper-evident history: the audit log, point-in-time and combined
//! snapshots, and tiered retention of memory entries.

pub mod combined;
pub mod log;
pub mod retention;
pub mod snapshot;

pub use combined::{CombinedSnapshot, CombinedSnapshotStore, RestoredSnapshot};
pub use log::{AuditDiff, AuditEvent, AuditLog, AuditLogEntry, VerificationReport};
pub use retention::{
    CompactionHook, CompactionOutcome, RetentionAction, RetentionConfig, RetentionDecision,
    RetentionMetadata, RetentionPassReport, RetentionPolicy, RetentionStats, RetentionTier,
    TierPolicy,
};
pub use snapshot::{RollbackResult, Snapshot, SnapshotManager};

use strata_store::StorageError;

use crate::hashing::HashError;
use crate::memory::ValidationError;

/// Errors produced by the audit, snapshot and retention layer.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("not found: {id}")]
    NotFound { id: String },

    #[error("integrity check failed for {id}: expected {expected}, computed {actual}")]
    IntegrityCheckFailed {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("no verified snapshot available")]
    NoVerifiedSnapshot,

    /// Retention tiers only move toward `ARCHIVED`.
    #[error("invalid retention transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: RetentionTier,
        to: RetentionTier,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;
