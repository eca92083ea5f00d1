use crate::{Ingester, IngesterConfig};
use anyhow::Result;
use apiwatch_common::types::ApplicationLog;
use apiwatch_storage::{LogQuery, LogQueryResult, LogStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FlakyLogStore {
    fail: AtomicBool,
    inserted: Mutex<Vec<ApplicationLog>>,
}

#[async_trait]
impl LogStore for FlakyLogStore {
    async fn batch_insert_logs(&self, logs: &[ApplicationLog]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        self.inserted.lock().unwrap().extend_from_slice(logs);
        Ok(())
    }

    async fn get_recent_logs(&self, _window: Duration) -> Result<Vec<ApplicationLog>> {
        Ok(self.inserted.lock().unwrap().clone())
    }

    async fn query_logs(&self, _query: &LogQuery) -> Result<LogQueryResult> {
        Ok(LogQueryResult {
            logs: vec![],
            total_count: 0,
            has_more: false,
        })
    }
}

fn raw_log(message: &str) -> serde_json::Value {
    serde_json::json!({
        "application_id": "app-1",
        "service_name": "checkout",
        "severity": "INFO",
        "message": message,
    })
}

fn config(buffer_size: usize, batch_size: usize) -> IngesterConfig {
    IngesterConfig {
        buffer_size,
        batch_size,
        flush_interval: Duration::from_millis(50),
    }
}

#[test]
fn missing_required_fields_are_rejected() {
    let store = Arc::new(FlakyLogStore::default());
    let ingester = Ingester::new(store, IngesterConfig::default());

    let missing_app = serde_json::json!({
        "application_id": "",
        "service_name": "svc",
        "severity": "INFO",
        "message": "m",
    });
    let err = ingester.ingest(missing_app).unwrap_err();
    assert!(err.to_string().contains("application_id"));

    let missing_severity = serde_json::json!({
        "application_id": "app",
        "service_name": "svc",
        "message": "m",
    });
    assert!(ingester.ingest(missing_severity).is_err());

    let missing_message = serde_json::json!({
        "application_id": "app",
        "service_name": "svc",
        "severity": "WARN",
        "message": "",
    });
    assert!(ingester.ingest(missing_message).is_err());

    assert_eq!(ingester.buffer_len(), 0);
}

#[test]
fn missing_timestamp_defaults_to_now() {
    let store = Arc::new(FlakyLogStore::default());
    let ingester = Ingester::new(store, IngesterConfig::default());
    ingester.ingest(raw_log("hello")).unwrap();
    assert_eq!(ingester.buffer_len(), 1);
}

#[tokio::test]
async fn size_trigger_flushes_everything() {
    let store = Arc::new(FlakyLogStore::default());
    let ingester = Ingester::new(store.clone(), config(100, 50));

    let loop_handle = {
        let ingester = ingester.clone();
        tokio::spawn(async move { ingester.run().await })
    };

    for i in 0..150 {
        ingester.ingest(raw_log(&format!("msg {i}"))).unwrap();
    }

    // final drain picks up whatever the size trigger left behind
    ingester.stop();
    loop_handle.await.unwrap();

    assert_eq!(store.inserted.lock().unwrap().len(), 150);
    assert_eq!(ingester.buffer_len(), 0);
}

#[tokio::test]
async fn failed_flush_requeues_in_order_and_retries() {
    let store = Arc::new(FlakyLogStore::default());
    store.fail.store(true, Ordering::SeqCst);
    let ingester = Ingester::new(store.clone(), config(10, 5));

    for i in 0..7 {
        ingester.ingest(raw_log(&format!("msg {i}"))).unwrap();
    }

    // storage down: the batch bounces back to the head of the queue
    ingester.flush_once().await;
    assert_eq!(ingester.buffer_len(), 7);
    assert!(store.inserted.lock().unwrap().is_empty());

    // storage recovered: the next triggers deliver everything in order
    store.fail.store(false, Ordering::SeqCst);
    ingester.flush_once().await;
    ingester.flush_once().await;

    assert_eq!(ingester.buffer_len(), 0);
    let inserted = store.inserted.lock().unwrap();
    assert_eq!(inserted.len(), 7);
    for (i, log) in inserted.iter().enumerate() {
        assert_eq!(log.message, format!("msg {i}"));
    }
}

#[tokio::test]
async fn time_trigger_drains_a_quiet_buffer() {
    let store = Arc::new(FlakyLogStore::default());
    let ingester = Ingester::new(store.clone(), config(1000, 100));

    for i in 0..3 {
        ingester.ingest(raw_log(&format!("msg {i}"))).unwrap();
    }

    let loop_handle = {
        let ingester = ingester.clone();
        tokio::spawn(async move { ingester.run().await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.inserted.lock().unwrap().len(), 3);
    assert_eq!(ingester.buffer_len(), 0);

    ingester.stop();
    loop_handle.await.unwrap();
}

#[tokio::test]
async fn stop_abandons_drain_when_storage_stays_down() {
    let store = Arc::new(FlakyLogStore::default());
    store.fail.store(true, Ordering::SeqCst);
    let ingester = Ingester::new(store.clone(), config(10, 5));

    for i in 0..4 {
        ingester.ingest(raw_log(&format!("msg {i}"))).unwrap();
    }

    let loop_handle = {
        let ingester = ingester.clone();
        tokio::spawn(async move { ingester.run().await })
    };
    ingester.stop();
    loop_handle.await.unwrap();

    // logs remain buffered rather than lost or spun on forever
    assert_eq!(ingester.buffer_len(), 4);
}

#[test]
fn ids_are_assigned_when_absent() {
    let store = Arc::new(FlakyLogStore::default());
    let ingester = Ingester::new(store, IngesterConfig::default());
    ingester
        .ingest(serde_json::json!({
            "application_id": "app",
            "service_name": "svc",
            "severity": "ERROR",
            "message": "boom",
            "trace_id": "t-1",
        }))
        .unwrap();
    assert_eq!(ingester.buffer_len(), 1);
}
