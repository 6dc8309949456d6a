use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hashing::{digest_of, HashResult};
use crate::Metadata;

/// One immutable version of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry<V> {
    pub key: String,
    pub value: V,
    /// Starts at 1 and grows by exactly 1 per successful update.
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Latest entry of every key at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot<V> {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub entries: BTreeMap<String, StateEntry<V>>,
}

impl<V> StateSnapshot<V> {
    pub(crate) fn new(entries: BTreeMap<String, StateEntry<V>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<&StateEntry<V>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for DiffOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Change of a single key between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDiff<V> {
    pub key: String,
    pub before: Option<StateEntry<V>>,
    pub after: Option<StateEntry<V>>,
    pub operation: DiffOperation,
    pub timestamp: DateTime<Utc>,
}

/// A rejected write, kept in the per-task conflict ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConflict<V> {
    pub key: String,
    pub operation: DiffOperation,
    pub expected_version: u64,
    pub actual_version: u64,
    /// Value the rejected update carried; `None` for a delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted_value: Option<V>,
    pub timestamp: DateTime<Utc>,
}

impl<V> StateConflict<V> {
    /// A rejected update of `key` carrying `attempted_value`.
    pub fn update(
        key: &str,
        expected_version: u64,
        actual_version: u64,
        attempted_value: V,
    ) -> Self {
        Self::rejected(
            key,
            DiffOperation::Update,
            expected_version,
            actual_version,
            Some(attempted_value),
        )
    }

    /// A rejected delete of `key`.
    pub fn delete(key: &str, expected_version: u64, actual_version: u64) -> Self {
        Self::rejected(
            key,
            DiffOperation::Delete,
            expected_version,
            actual_version,
            None,
        )
    }

    fn rejected(
        key: &str,
        operation: DiffOperation,
        expected_version: u64,
        actual_version: u64,
        attempted_value: Option<V>,
    ) -> Self {
        Self {
            key: key.to_string(),
            operation,
            expected_version,
            actual_version,
            attempted_value,
            timestamp: Utc::now(),
        }
    }
}

/// Compare two snapshots key by key.
///
/// Walks the sorted union of both key sets, so the result does not depend on
/// how either snapshot was built. A key counts as updated when its version or
/// its entry timestamp moved; the latter catches a delete followed by a fresh
/// create that landed on the same version number.
pub fn diff_snapshots<V: Clone>(
    before: &StateSnapshot<V>,
    after: &StateSnapshot<V>,
) -> Vec<StateDiff<V>> {
    let now = Utc::now();
    let keys: BTreeSet<&String> = before.entries.keys().chain(after.entries.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let b = before.entries.get(key);
            let a = after.entries.get(key);
            let operation = match (b, a) {
                (None, Some(_)) => DiffOperation::Create,
                (Some(_), None) => DiffOperation::Delete,
                (Some(b), Some(a)) if b.version != a.version || b.timestamp != a.timestamp => {
                    DiffOperation::Update
                }
                _ => return None,
            };
            Some(StateDiff {
                key: key.clone(),
                before: b.cloned(),
                after: a.cloned(),
                operation,
                timestamp: now,
            })
        })
        .collect()
}

/// Content fingerprint of a snapshot's entries; ignores its id and timestamp.
pub fn snapshot_fingerprint<V: Serialize>(snapshot: &StateSnapshot<V>) -> HashResult<String> {
    digest_of(&snapshot.entries)
}
