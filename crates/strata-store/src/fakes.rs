//! In-memory fakes for the `RecordStore` trait (testing only)
//!
//! Provides `MemoryRecordStore`, which satisfies the trait contract without any
//! external dependencies, and `FailingRecordStore`, which rejects every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::*;

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

type RecordMap = HashMap<(Collection, String), PersistedRecord>;

/// In-memory record store backed by a `HashMap<(collection, id), record>`.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<RecordMap>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all collections.
    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a stored record's body in place, bypassing `save`.
    ///
    /// Lets tests simulate tampering at rest.
    pub fn tamper(&self, collection: Collection, id: &str, body: serde_json::Value) -> bool {
        match self.lock() {
            Ok(mut records) => match records.get_mut(&(collection, id.to_string())) {
                Some(record) => {
                    record.body = body;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, RecordMap>> {
        self.records
            .lock()
            .map_err(|_| StorageError::Backend("record map lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: PersistedRecord) -> StorageResult<()> {
        let mut records = self.lock()?;
        records.insert((record.collection, record.id.clone()), record);
        Ok(())
    }

    async fn load(&self, collection: Collection, id: &str) -> StorageResult<PersistedRecord> {
        let records = self.lock()?;
        records
            .get(&(collection, id.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                collection,
                id: id.to_string(),
            })
    }

    async fn load_all(&self, collection: Collection) -> StorageResult<Vec<PersistedRecord>> {
        self.query(&RecordQuery::new(collection)).await
    }

    async fn query(&self, query: &RecordQuery) -> StorageResult<Vec<PersistedRecord>> {
        let records = self.lock()?;
        Ok(apply_query(records.values().cloned(), query))
    }
}

// ---------------------------------------------------------------------------
// FailingRecordStore
// ---------------------------------------------------------------------------

/// A store whose every operation fails with `StorageError::Backend`.
#[derive(Debug, Default)]
pub struct FailingRecordStore {
    attempts: AtomicU64,
}

impl FailingRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many calls have been rejected so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StorageResult<T> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Backend("store unavailable".to_string()))
    }
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn save(&self, _record: PersistedRecord) -> StorageResult<()> {
        self.fail()
    }

    async fn load(&self, _collection: Collection, _id: &str) -> StorageResult<PersistedRecord> {
        self.fail()
    }

    async fn load_all(&self, _collection: Collection) -> StorageResult<Vec<PersistedRecord>> {
        self.fail()
    }

    async fn query(&self, _query: &RecordQuery) -> StorageResult<Vec<PersistedRecord>> {
        self.fail()
    }
}
