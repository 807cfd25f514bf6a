//! Integration tests for the HTTP endpoints
//!
//! These tests verify that:
//! - Path and JSON updates store gauges and accumulate counters
//! - Reads return plain text, JSON and the HTML listing
//! - Error statuses follow the error taxonomy

use metrics_relay::{Metric, api::PipelineConfig, codec::gzip};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;

use crate::helpers::spawn_server;

#[tokio::test]
async fn test_path_update_and_read() {
    let server = spawn_server(PipelineConfig::default()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/update/gauge/Alloc/12345.67"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Metric Alloc updated");

    for _ in 0..2 {
        let response = client
            .post(server.url("/update/counter/PollCount/1"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let gauge = client
        .get(server.url("/value/gauge/Alloc"))
        .send()
        .await
        .unwrap();
    assert_eq!(gauge.status(), StatusCode::OK);
    assert_eq!(gauge.text().await.unwrap(), "12345.67");

    let counter = client
        .get(server.url("/value/counter/PollCount"))
        .send()
        .await
        .unwrap();
    assert_eq!(counter.text().await.unwrap(), "2");
}

#[tokio::test]
async fn test_path_update_rejects_bad_input() {
    let server = spawn_server(PipelineConfig::default()).await;
    let client = reqwest::Client::new();

    let unknown_kind = client
        .post(server.url("/update/histogram/Alloc/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_kind.status(), StatusCode::BAD_REQUEST);

    let bad_value = client
        .post(server.url("/update/counter/PollCount/1.5"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_value.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = bad_value.json().await.unwrap();
    assert!(body["error"].is_string());

    let missing_name = client
        .post(server.url("/update/gauge/"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_name.status(), StatusCode::NOT_FOUND);

    assert_eq!(server.storage.get_all_metrics().await.len(), 0);
}

#[tokio::test]
async fn test_json_update_returns_accumulated_counter() {
    let server = spawn_server(PipelineConfig::default()).await;
    let client = reqwest::Client::new();

    let mut last = None;
    for _ in 0..3 {
        let response = client
            .post(server.url("/update/"))
            .json(&json!({"id": "requests", "type": "counter", "delta": 5}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = Some(response.json::<Metric>().await.unwrap());
    }

    assert_eq!(last, Some(Metric::counter("requests", 15)));
}

#[tokio::test]
async fn test_json_update_requires_content_type() {
    let server = spawn_server(PipelineConfig::default()).await;

    let response = reqwest::Client::new()
        .post(server.url("/update/"))
        .body(r#"{"id": "Alloc", "type": "gauge", "value": 1.0}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_json_update_rejects_missing_payload() {
    let server = spawn_server(PipelineConfig::default()).await;

    let response = reqwest::Client::new()
        .post(server.url("/update/"))
        .json(&json!({"id": "Alloc", "type": "gauge"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_value_lookup() {
    let server = spawn_server(PipelineConfig::default()).await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/update/gauge/Alloc/1.5"))
        .send()
        .await
        .unwrap();

    let found = client
        .post(server.url("/value/"))
        .json(&json!({"id": "Alloc", "type": "gauge"}))
        .send()
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    assert_eq!(found.json::<Metric>().await.unwrap(), Metric::gauge("Alloc", 1.5));

    let missing = client
        .post(server.url("/value/"))
        .json(&json!({"id": "missing", "type": "gauge"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let wrong_kind = client
        .get(server.url("/value/counter/Alloc"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_kind.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_update() {
    let server = spawn_server(PipelineConfig::default()).await;
    let client = reqwest::Client::new();
    let batch = json!([
        {"id": "g1", "type": "gauge", "value": 1.5},
        {"id": "c1", "type": "counter", "delta": 3}
    ]);

    for _ in 0..2 {
        let response = client
            .post(server.url("/updates/"))
            .json(&batch)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(server.storage.get_counter("c1").await.unwrap(), 6);
    assert_eq!(server.storage.get_gauge("g1").await.unwrap(), 1.5);

    let empty = client
        .post(server.url("/updates/"))
        .json(&json!([]))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let unknown_kind = client
        .post(server.url("/updates/"))
        .json(&json!([{"id": "h", "type": "histogram", "value": 1.0}]))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_kind.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gzip_request_bodies() {
    let server = spawn_server(PipelineConfig::default()).await;
    let client = reqwest::Client::new();
    let body = gzip(br#"[{"id": "g1", "type": "gauge", "value": 2.5}]"#).unwrap();

    let response = client
        .post(server.url("/updates/"))
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.storage.get_gauge("g1").await.unwrap(), 2.5);

    let malformed = client
        .post(server.url("/updates/"))
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .body("definitely not gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_responses_are_compressed() {
    let server = spawn_server(PipelineConfig::default()).await;
    server.storage.save_gauge("Alloc", 1.0).await.unwrap();

    let client = reqwest::Client::builder().no_gzip().build().unwrap();
    let response = client
        .get(server.url("/"))
        .header("Accept-Encoding", "gzip")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("Content-Encoding")
            .and_then(|v| v.to_str().ok()),
        Some("gzip")
    );
}

#[tokio::test]
async fn test_html_listing() {
    let server = spawn_server(PipelineConfig::default()).await;
    server.storage.save_gauge("Alloc", 12.5).await.unwrap();
    server.storage.save_counter("PollCount", 4).await.unwrap();
    server.storage.save_gauge("<b>", 1.0).await.unwrap();

    let response = reqwest::get(server.url("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"))
    );

    let page = response.text().await.unwrap();
    assert!(page.contains("<td>Alloc</td><td>gauge</td><td>12.5</td>"));
    assert!(page.contains("<td>PollCount</td><td>counter</td><td>4</td>"));
    assert!(page.contains("<td>&lt;b&gt;</td><td>gauge</td><td>1</td>"));
}

#[tokio::test]
async fn test_ping() {
    let server = spawn_server(PipelineConfig::default()).await;

    let response = reqwest::get(server.url("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}
