//! Trait contract tests for RecordStore.
//!
//! Every conforming adapter must pass these; they run against the in-memory
//! fake and the filesystem store.

use chrono::{Duration, Utc};
use serde_json::json;
use strata_store::fakes::{FailingRecordStore, MemoryRecordStore};
use strata_store::*;

fn record(collection: Collection, id: &str, seq: u64) -> PersistedRecord {
    PersistedRecord::new(collection, id, seq, json!({ "id": id, "seq": seq }))
}

async fn contract_save_then_load(store: &dyn RecordStore) {
    let r = record(Collection::AuditEntry, "entry-1", 1).with_task("task-a");
    store.save(r.clone()).await.unwrap();
    let back = store.load(Collection::AuditEntry, "entry-1").await.unwrap();
    assert_eq!(back, r);
}

async fn contract_load_missing(store: &dyn RecordStore) {
    let err = store.load(Collection::Snapshot, "nope").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

async fn contract_save_replaces(store: &dyn RecordStore) {
    store.save(record(Collection::Snapshot, "s", 1)).await.unwrap();
    let mut updated = record(Collection::Snapshot, "s", 1);
    updated.body = json!({ "verified": true });
    store.save(updated).await.unwrap();

    let all = store.load_all(Collection::Snapshot).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].body, json!({ "verified": true }));
}

async fn contract_load_all_ordered_by_sequence(store: &dyn RecordStore) {
    for (id, seq) in [("c", 3), ("a", 1), ("b", 2)] {
        store.save(record(Collection::GraphLog, id, seq)).await.unwrap();
    }
    store.save(record(Collection::AuditEntry, "other", 0)).await.unwrap();

    let all = store.load_all(Collection::GraphLog).await.unwrap();
    let seqs: Vec<u64> = all.iter().map(|r| r.sequence).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

async fn contract_query_filters(store: &dyn RecordStore) {
    let now = Utc::now();
    store
        .save(
            record(Collection::CombinedSnapshot, "old", 1)
                .with_task("t1")
                .with_timestamp(now - Duration::hours(2)),
        )
        .await
        .unwrap();
    store
        .save(record(Collection::CombinedSnapshot, "new", 2).with_task("t1"))
        .await
        .unwrap();
    store
        .save(record(Collection::CombinedSnapshot, "foreign", 3).with_task("t2"))
        .await
        .unwrap();

    let q = RecordQuery::new(Collection::CombinedSnapshot).with_task("t1");
    assert_eq!(store.query(&q).await.unwrap().len(), 2);

    let q = q.after(now - Duration::minutes(1));
    let hits = store.query(&q).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "new");

    let q = RecordQuery::new(Collection::CombinedSnapshot).with_limit(1);
    assert_eq!(store.query(&q).await.unwrap()[0].id, "old");
}

async fn contract_ids_differing_in_punctuation_stay_distinct(store: &dyn RecordStore) {
    let ids = ["user:1@1:create", "user_1@1:create", "user.1@1:create", "user%3A1@1:create"];
    for (seq, id) in ids.iter().enumerate() {
        store
            .save(record(Collection::TemporalIndex, id, seq as u64 + 1))
            .await
            .unwrap();
    }

    let all = store.load_all(Collection::TemporalIndex).await.unwrap();
    let loaded: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(loaded, ids);
    for id in ids {
        let back = store.load(Collection::TemporalIndex, id).await.unwrap();
        assert_eq!(back.body["id"], json!(id));
    }
}

// ===========================================================================
// MemoryRecordStore
// ===========================================================================

#[tokio::test]
async fn memory_store_contracts() {
    contract_save_then_load(&MemoryRecordStore::new()).await;
    contract_load_missing(&MemoryRecordStore::new()).await;
    contract_save_replaces(&MemoryRecordStore::new()).await;
    contract_load_all_ordered_by_sequence(&MemoryRecordStore::new()).await;
    contract_query_filters(&MemoryRecordStore::new()).await;
    contract_ids_differing_in_punctuation_stay_distinct(&MemoryRecordStore::new()).await;
}

#[tokio::test]
async fn memory_store_tamper_rewrites_body() {
    let store = MemoryRecordStore::new();
    store.save(record(Collection::AuditEntry, "e", 1)).await.unwrap();
    assert!(store.tamper(Collection::AuditEntry, "e", json!("forged")));
    assert!(!store.tamper(Collection::AuditEntry, "missing", json!(null)));

    let back = store.load(Collection::AuditEntry, "e").await.unwrap();
    assert_eq!(back.body, json!("forged"));
}

// ===========================================================================
// FsRecordStore
// ===========================================================================

#[tokio::test]
async fn fs_store_contracts() {
    for contract in 0..6 {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path()).unwrap();
        match contract {
            0 => contract_save_then_load(&store).await,
            1 => contract_load_missing(&store).await,
            2 => contract_save_replaces(&store).await,
            3 => contract_load_all_ordered_by_sequence(&store).await,
            4 => contract_query_filters(&store).await,
            _ => contract_ids_differing_in_punctuation_stay_distinct(&store).await,
        }
    }
}

#[tokio::test]
async fn fs_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FsRecordStore::new(dir.path()).unwrap();
        store.save(record(Collection::TemporalIndex, "k:1", 1)).await.unwrap();
    }
    let reopened = FsRecordStore::new(dir.path()).unwrap();
    let back = reopened.load(Collection::TemporalIndex, "k:1").await.unwrap();
    assert_eq!(back.sequence, 1);
}

// ===========================================================================
// FailingRecordStore
// ===========================================================================

#[tokio::test]
async fn failing_store_rejects_everything() {
    let store = FailingRecordStore::new();
    assert!(store.save(record(Collection::Snapshot, "s", 1)).await.is_err());
    assert!(store.load_all(Collection::Snapshot).await.is_err());
    assert_eq!(store.attempts(), 2);
}
