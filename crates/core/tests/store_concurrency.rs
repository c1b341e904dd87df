//! Store integration tests: write serialization, fallback strategies and
//! notification behavior under concurrent writers.

use std::sync::{Arc, Mutex};

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::json;

use zaptv_core::store::{BulkWriteOp, NativeBulkWriter};
use zaptv_core::{CatalogStore, Record, StoreError, StoreOptions};

fn channel(id: &str, name: &str) -> Record {
    let mut r = Record::new();
    r.insert("stream_id".into(), json!(id));
    r.insert("source_id".into(), json!("src-1"));
    r.insert("name".into(), json!(name));
    r
}

#[tokio::test]
async fn test_writes_on_same_kind_apply_in_program_order() {
    let store = CatalogStore::in_memory().unwrap();
    let channels = store.table("channels").unwrap();

    channels.put(&channel("1", "first")).await.unwrap();
    channels.put(&channel("1", "second")).await.unwrap();

    let row = channels.get(&json!("1")).unwrap().unwrap();
    assert_eq!(row["name"], json!("second"));
}

#[tokio::test]
async fn test_concurrent_writers_from_unrelated_tasks() {
    let store = CatalogStore::in_memory().unwrap();

    // A bulk sync job and a user action racing on different key ranges.
    let sync_store = store.clone();
    let sync_job = tokio::spawn(async move {
        let channels = sync_store.table("channels").unwrap();
        let records: Vec<Record> = (0..1_000)
            .map(|i| channel(&format!("sync-{i}"), "from sync"))
            .collect();
        channels.bulk_put(&records).await.unwrap();
    });

    let user_store = store.clone();
    let user_action = tokio::spawn(async move {
        let channels = user_store.table("channels").unwrap();
        for i in 0..50 {
            channels
                .put(&channel(&format!("user-{i}"), "from user"))
                .await
                .unwrap();
        }
    });

    sync_job.await.unwrap();
    user_action.await.unwrap();

    let channels = store.table("channels").unwrap();
    assert_eq!(channels.count().unwrap(), 1_050);
}

#[tokio::test]
async fn test_failed_write_does_not_wedge_subsequent_writes() {
    let store = CatalogStore::in_memory().unwrap();
    let channels = store.table("channels").unwrap();

    channels.add(&channel("1", "a")).await.unwrap();
    let err = channels.add(&channel("1", "b")).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));

    // The serializer queue is still healthy.
    channels.put(&channel("2", "c")).await.unwrap();
    assert_eq!(channels.count().unwrap(), 2);
}

struct FailingWriter;

impl NativeBulkWriter for FailingWriter {
    fn write_chunk(
        &self,
        _conn: &mut Connection,
        _table: &str,
        _columns: &[&'static str],
        _rows: &[Vec<SqlValue>],
        _op: BulkWriteOp,
    ) -> anyhow::Result<()> {
        anyhow::bail!("native path unavailable")
    }
}

#[tokio::test]
async fn test_bulk_put_survives_native_writer_failure() {
    let store =
        CatalogStore::in_memory_with(StoreOptions::default(), Box::new(FailingWriter)).unwrap();
    let channels = store.table("channels").unwrap();

    let records: Vec<Record> = (0..400)
        .map(|i| channel(&i.to_string(), "ch"))
        .collect();
    assert_eq!(channels.bulk_put(&records).await.unwrap(), 400);
    assert_eq!(channels.count().unwrap(), 400);
}

#[tokio::test]
async fn test_tight_parameter_bound_still_writes_everything() {
    let options = StoreOptions {
        max_bound_params: 30,
        ..StoreOptions::default()
    };
    let store = CatalogStore::in_memory_with(options, Box::new(FailingWriter)).unwrap();
    let channels = store.table("channels").unwrap();

    let records: Vec<Record> = (0..123)
        .map(|i| channel(&i.to_string(), "ch"))
        .collect();
    assert_eq!(channels.bulk_put(&records).await.unwrap(), 123);
    assert_eq!(channels.count().unwrap(), 123);
}

#[tokio::test]
async fn test_reads_observe_queued_writes_after_await() {
    let store = CatalogStore::in_memory().unwrap();
    let channels = store.table("channels").unwrap();

    let events = Arc::new(Mutex::new(0usize));
    let events_clone = Arc::clone(&events);
    let _sub = store.changes().subscribe(move |event| {
        if event.kind == "channels" {
            *events_clone.lock().unwrap() += 1;
        }
    });

    channels.put(&channel("1", "a")).await.unwrap();
    // Once the await returns the effect is committed and the event is out.
    assert!(channels.get(&json!("1")).unwrap().is_some());
    assert_eq!(*events.lock().unwrap(), 1);
}
