//! Crate-level error taxonomy.

use strata_store::StorageError;

use crate::audit::AuditError;
use crate::causal::GraphError;
use crate::config::ConfigError;
use crate::hashing::HashError;
use crate::memory::{MemoryError, ValidationError};
use crate::state::StateError;

/// Any error surfaced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for fallible crate operations.
pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> Result<u64> {
        let read: crate::state::StateResult<u64> = Err(StateError::NotFound {
            key: "user:1".to_string(),
        });
        Ok(read?)
    }

    #[test]
    fn subsystem_errors_convert() {
        let err = lookup().unwrap_err();
        assert!(matches!(err, StrataError::State(StateError::NotFound { .. })));
        assert!(err.to_string().starts_with("state error: "));

        let err: StrataError = ValidationError::MissingField { field: "task_id" }.into();
        assert_eq!(err.to_string(), "validation error: missing required field: task_id");
    }
}
