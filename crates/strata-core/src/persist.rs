//! Write-behind persistence.
//!
//! Subsystems hand finished records to a [`WriteBehind`] and return at once.
//! A background task drains a bounded channel into a [`RecordStore`]. A full
//! queue, a closed queue or a failed save is logged and counted; none of them
//! reach the caller, because in-memory state is the system of record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strata_store::{Collection, PersistedRecord, RecordStore};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::metrics::METRICS;
use crate::obs::emit_persistence_failure;

/// Cloneable handle to a write-behind queue.
///
/// The background task exits once every clone has been dropped and the queue
/// is drained; await the `JoinHandle` from [`WriteBehind::spawn`] to flush.
#[derive(Debug, Clone)]
pub struct WriteBehind {
    tx: mpsc::Sender<PersistedRecord>,
    sequence: Arc<AtomicU64>,
}

impl WriteBehind {
    /// Spawn the drain task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn RecordStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PersistedRecord>(capacity.max(1));
        let handle = tokio::spawn(async move {
            let mut saved = 0u64;
            while let Some(record) = rx.recv().await {
                let collection = record.collection;
                let id = record.id.clone();
                match store.save(record).await {
                    Ok(()) => saved += 1,
                    Err(err) => {
                        METRICS.inc_persistence_failures();
                        emit_persistence_failure(collection.as_str(), &id, &err);
                    }
                }
            }
            debug!(saved, "write-behind queue drained");
        });
        (
            Self {
                tx,
                sequence: Arc::new(AtomicU64::new(1)),
            },
            handle,
        )
    }

    /// Serialize `body` and queue it. Never blocks, never fails the caller.
    ///
    /// Records are numbered in enqueue order; callers that need a stable
    /// order on reload enqueue while still holding their own append lock.
    /// Returns the sequence assigned, or `None` if `body` failed to serialize.
    pub fn enqueue<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        id: &str,
        task_id: Option<&str>,
        timestamp: DateTime<Utc>,
        body: &T,
    ) -> Option<u64> {
        let body = Self::to_body(collection, id, body)?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.enqueue_record(Self::record(collection, id, sequence, task_id, timestamp, body));
        Some(sequence)
    }

    /// Queue a new version of a record that was already saved under
    /// `sequence`. The store replaces it in place, so its reload position
    /// stays where it was first appended.
    pub fn reenqueue<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        id: &str,
        sequence: u64,
        task_id: Option<&str>,
        timestamp: DateTime<Utc>,
        body: &T,
    ) {
        if let Some(body) = Self::to_body(collection, id, body) {
            self.enqueue_record(Self::record(collection, id, sequence, task_id, timestamp, body));
        }
    }

    fn to_body<T: Serialize + ?Sized>(
        collection: Collection,
        id: &str,
        body: &T,
    ) -> Option<serde_json::Value> {
        match serde_json::to_value(body) {
            Ok(body) => Some(body),
            Err(err) => {
                METRICS.inc_persistence_failures();
                emit_persistence_failure(collection.as_str(), id, &err);
                None
            }
        }
    }

    fn record(
        collection: Collection,
        id: &str,
        sequence: u64,
        task_id: Option<&str>,
        timestamp: DateTime<Utc>,
        body: serde_json::Value,
    ) -> PersistedRecord {
        let record =
            PersistedRecord::new(collection, id, sequence, body).with_timestamp(timestamp);
        match task_id {
            Some(task_id) => record.with_task(task_id),
            None => record,
        }
    }

    /// Number future records after `sequence`. Used when resuming on top of
    /// records loaded from the same store.
    pub fn resume_after(&self, sequence: u64) {
        self.sequence.fetch_max(sequence + 1, Ordering::SeqCst);
    }

    /// Queue an already-built record as is.
    pub fn enqueue_record(&self, record: PersistedRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                METRICS.inc_persistence_failures();
                emit_persistence_failure(record.collection.as_str(), &record.id, &"queue full");
            }
            Err(TrySendError::Closed(record)) => {
                METRICS.inc_persistence_failures();
                emit_persistence_failure(record.collection.as_str(), &record.id, &"queue closed");
            }
        }
    }
}
