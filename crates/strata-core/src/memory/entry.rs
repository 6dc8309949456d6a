use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provenance::Provenance;
use crate::hashing::{compute_digest, HashResult};

/// A unit of agent memory. The content is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    pub provenance: Provenance,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MemoryEntry {
    pub fn new(id: &str, kind: &str, content: Value, provenance: Provenance) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            content,
            provenance,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// When the entry was produced, per its provenance.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.provenance.timestamp
    }

    /// Digest of the canonical JSON of `content`.
    pub fn content_hash(&self) -> HashResult<String> {
        compute_digest(&self.content)
    }

    /// Byte length of the canonical content; what a compactor starts from.
    pub fn content_size(&self) -> HashResult<u64> {
        Ok(crate::hashing::canonical_json(&self.content)?.len() as u64)
    }

    pub fn pointer(&self) -> HashResult<MemoryPointer> {
        Ok(MemoryPointer {
            entry_id: self.id.clone(),
            kind: self.kind.clone(),
            content_hash: self.content_hash()?,
            timestamp: self.timestamp(),
        })
    }
}

/// Reference to a memory entry inside a combined snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPointer {
    pub entry_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
}
