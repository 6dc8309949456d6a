//! Error types for strata-store

use thiserror::Error;

use crate::record::Collection;

/// Errors raised by persistence adapters.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record with this id in the collection
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record body could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}
