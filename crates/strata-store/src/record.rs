//! Record and adapter trait definitions.
//!
//! Every persisted artifact of the core (snapshots, audit entries, graph log
//! entries, temporal index entries) travels as a [`PersistedRecord`]: an opaque
//! JSON body plus the few columns adapters need for filtering and ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Logical table a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Snapshot,
    CombinedSnapshot,
    AuditEntry,
    GraphLog,
    TemporalIndex,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::CombinedSnapshot => "combined_snapshot",
            Self::AuditEntry => "audit_entry",
            Self::GraphLog => "graph_log",
            Self::TemporalIndex => "temporal_index",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub collection: Collection,
    pub id: String,
    /// Append order assigned by the producing subsystem.
    pub sequence: u64,
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub body: serde_json::Value,
}

impl PersistedRecord {
    pub fn new(
        collection: Collection,
        id: impl Into<String>,
        sequence: u64,
        body: serde_json::Value,
    ) -> Self {
        Self {
            collection,
            id: id.into(),
            sequence,
            task_id: None,
            timestamp: Utc::now(),
            body,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Filter for [`RecordStore::query`].
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub collection: Collection,
    pub task_id: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            task_id: None,
            after: None,
            limit: None,
        }
    }

    pub fn with_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` satisfies every filter except `limit`.
    pub fn matches(&self, record: &PersistedRecord) -> bool {
        if record.collection != self.collection {
            return false;
        }
        if let Some(ref task_id) = self.task_id {
            if record.task_id.as_deref() != Some(task_id.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.after {
            if record.timestamp <= after {
                return false;
            }
        }
        true
    }
}

/// Pluggable persistence backend.
///
/// Guarantees:
/// - `save` of an existing `(collection, id)` replaces the stored record.
/// - `load_all` and `query` return records ordered by `sequence`, then `id`.
/// - `load` of an unknown id returns `StorageError::NotFound`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(&self, record: PersistedRecord) -> StorageResult<()>;

    async fn load(&self, collection: Collection, id: &str) -> StorageResult<PersistedRecord>;

    async fn load_all(&self, collection: Collection) -> StorageResult<Vec<PersistedRecord>>;

    async fn query(&self, query: &RecordQuery) -> StorageResult<Vec<PersistedRecord>>;
}

/// Sort records into the order mandated by the trait contract.
pub(crate) fn sort_records(records: &mut [PersistedRecord]) {
    records.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
}

/// Apply `query` to an already collection-filtered set of records.
pub(crate) fn apply_query(
    records: impl IntoIterator<Item = PersistedRecord>,
    query: &RecordQuery,
) -> Vec<PersistedRecord> {
    let mut matched: Vec<PersistedRecord> =
        records.into_iter().filter(|r| query.matches(r)).collect();
    sort_records(&mut matched);
    if let Some(limit) = query.limit {
        matched.truncate(limit);
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn query_filters_on_task_and_time() {
        let now = Utc::now();
        let a = PersistedRecord::new(Collection::AuditEntry, "a", 1, json!({}))
            .with_task("t1")
            .with_timestamp(now - Duration::minutes(5));
        let b = PersistedRecord::new(Collection::AuditEntry, "b", 2, json!({}))
            .with_task("t2")
            .with_timestamp(now);

        let q = RecordQuery::new(Collection::AuditEntry).with_task("t1");
        assert!(q.matches(&a));
        assert!(!q.matches(&b));

        let q = RecordQuery::new(Collection::AuditEntry).after(now - Duration::minutes(1));
        assert!(!q.matches(&a));
        assert!(q.matches(&b));
    }

    #[test]
    fn query_rejects_other_collections() {
        let r = PersistedRecord::new(Collection::GraphLog, "g", 1, json!(null));
        assert!(!RecordQuery::new(Collection::Snapshot).matches(&r));
    }

    #[test]
    fn apply_query_orders_by_sequence_and_limits() {
        let records = vec![
            PersistedRecord::new(Collection::Snapshot, "c", 3, json!(3)),
            PersistedRecord::new(Collection::Snapshot, "a", 1, json!(1)),
            PersistedRecord::new(Collection::Snapshot, "b", 2, json!(2)),
        ];
        let out = apply_query(records, &RecordQuery::new(Collection::Snapshot).with_limit(2));
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn collection_display_matches_serde() {
        let json = serde_json::to_string(&Collection::CombinedSnapshot).unwrap();
        assert_eq!(json, format!("\"{}\"", Collection::CombinedSnapshot));
    }
}
