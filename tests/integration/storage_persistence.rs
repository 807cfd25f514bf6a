//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Metrics written through the API survive a restart on both backends
//! - Concurrent counter updates are never lost

use std::sync::Arc;

use metrics_relay::{
    api::PipelineConfig,
    retry::RetryExecutor,
    storage::{StorageEngine, memory::MemoryStore, sqlite::RelationalStore},
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;
use tempfile::tempdir;

use crate::helpers::spawn_server_with;

#[tokio::test]
async fn test_relational_store_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("metrics.db");
    let dsn = db_path.to_string_lossy().to_string();

    {
        let store = RelationalStore::connect(&dsn, RetryExecutor::default())
            .await
            .unwrap();
        let storage: Arc<dyn StorageEngine> = Arc::new(store);
        let server = spawn_server_with(storage.clone(), PipelineConfig::default()).await;

        let response = reqwest::Client::new()
            .post(server.url("/updates/"))
            .json(&json!([
                {"id": "Alloc", "type": "gauge", "value": 42.5},
                {"id": "PollCount", "type": "counter", "delta": 7}
            ]))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        drop(server);
        storage.close().await.unwrap();
    }

    let reopened = RelationalStore::connect(&dsn, RetryExecutor::default())
        .await
        .unwrap();
    assert_eq!(reopened.get_gauge("Alloc").await.unwrap(), 42.5);
    assert_eq!(reopened.get_counter("PollCount").await.unwrap(), 7);
}

#[tokio::test]
async fn test_memory_store_snapshot_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics-db.json");

    {
        let storage: Arc<dyn StorageEngine> = Arc::new(MemoryStore::with_snapshot(
            path.clone(),
            true,
            RetryExecutor::default(),
        ));
        let server = spawn_server_with(storage, PipelineConfig::default()).await;
        let client = reqwest::Client::new();

        for url in ["/update/gauge/Alloc/3.25", "/update/counter/PollCount/2"] {
            let response = client.post(server.url(url)).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    let restored = MemoryStore::with_snapshot(path, false, RetryExecutor::default());
    restored.load().await.unwrap();

    assert_eq!(restored.get_gauge("Alloc").await.unwrap(), 3.25);
    assert_eq!(restored.get_counter("PollCount").await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_counter_updates_are_not_lost() {
    let dir = tempdir().unwrap();
    let dsn = dir.path().join("metrics.db").to_string_lossy().to_string();
    let store = RelationalStore::connect(&dsn, RetryExecutor::default())
        .await
        .unwrap();
    let server = spawn_server_with(Arc::new(store), PipelineConfig::default()).await;
    let client = reqwest::Client::new();

    let mut handles = vec![];
    for _ in 0..20 {
        let client = client.clone();
        let url = server.url("/update/counter/hits/1");
        handles.push(tokio::spawn(async move {
            client.post(url).send().await.unwrap().status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(server.storage.get_counter("hits").await.unwrap(), 20);
}
