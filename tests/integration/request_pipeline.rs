//! Integration tests for the server request pipeline
//!
//! These tests verify that:
//! - Signed, encrypted and compressed requests from the HTTP transport land in storage
//! - Tampered or unsigned bodies never reach the handlers
//! - Callers outside the trusted subnet are turned away

use metrics_relay::{
    MetricSet, MetricValue,
    agent::dispatcher::deliver,
    api::PipelineConfig,
    crypto::{self, SIGNATURE_HEADER},
    transport::{HttpTransport, Transport, TransportError},
};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;

use crate::helpers::{spawn_server, stored_count, test_key};

const KEY: &[u8] = b"shared-secret";

fn signed() -> PipelineConfig {
    PipelineConfig {
        signing_key: Some(KEY.to_vec()),
        ..Default::default()
    }
}

fn sample() -> MetricSet {
    MetricSet::from([
        ("g1".to_string(), MetricValue::Gauge(1.5)),
        ("c1".to_string(), MetricValue::Counter(3)),
    ])
}

/// Enough distinct metrics that the compressed batch outgrows a 1024-bit key.
fn large_sample() -> MetricSet {
    (0..60)
        .map(|i| (format!("metric_{i:03}"), MetricValue::Gauge(i as f64 * 1.25 + 0.1)))
        .collect()
}

#[tokio::test]
async fn test_signed_batch_is_accepted() {
    let server = spawn_server(signed()).await;
    let transport = HttpTransport::new(&server.address())
        .unwrap()
        .with_signing_key(KEY);

    transport.send_batch(&sample()).await.unwrap();

    assert_eq!(server.storage.get_gauge("g1").await.unwrap(), 1.5);
    assert_eq!(server.storage.get_counter("c1").await.unwrap(), 3);
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let server = spawn_server(signed()).await;
    let body = br#"[{"id":"c1","type":"counter","delta":3}]"#.to_vec();
    let signature = crypto::sign(KEY, &body);

    let mut tampered = body.clone();
    let idx = tampered.len() - 3;
    tampered[idx] = b'9';

    let response = reqwest::Client::new()
        .post(server.url("/updates/"))
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(tampered)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stored_count(server.storage.as_ref()).await, 0);
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let server = spawn_server(signed()).await;

    let response = reqwest::Client::new()
        .post(server.url("/update/counter/c1/1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stored_count(server.storage.as_ref()).await, 0);
}

#[tokio::test]
async fn test_accepted_signature_is_echoed() {
    let server = spawn_server(signed()).await;
    let body = br#"[{"id":"g1","type":"gauge","value":2.0}]"#.to_vec();
    let signature = crypto::sign(KEY, &body);

    let response = reqwest::Client::new()
        .post(server.url("/updates/"))
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, &signature)
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok()),
        Some(signature.as_str())
    );
}

#[tokio::test]
async fn test_reads_do_not_require_signature() {
    let server = spawn_server(signed()).await;
    server.storage.save_gauge("g1", 4.0).await.unwrap();

    let response = reqwest::get(server.url("/value/gauge/g1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "4");
}

#[tokio::test]
async fn test_encrypted_signed_batch_lands_in_storage() {
    let key = test_key();
    let server = spawn_server(PipelineConfig {
        signing_key: Some(KEY.to_vec()),
        private_key: Some(key.clone()),
        trusted_subnet: None,
    })
    .await;

    let transport = HttpTransport::new(&server.address())
        .unwrap()
        .with_signing_key(KEY)
        .with_public_key(key.public_key());

    transport.send_batch(&sample()).await.unwrap();

    assert_eq!(server.storage.get_gauge("g1").await.unwrap(), 1.5);
    assert_eq!(server.storage.get_counter("c1").await.unwrap(), 3);
}

#[tokio::test]
async fn test_undecryptable_body_is_rejected() {
    let server = spawn_server(PipelineConfig {
        private_key: Some(test_key()),
        ..Default::default()
    })
    .await;

    let response = reqwest::Client::new()
        .post(server.url("/updates/"))
        .header("Content-Type", "application/json")
        .header("Content-Encrypted", "true")
        .body(vec![7u8; 128])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stored_count(server.storage.as_ref()).await, 0);
}

#[tokio::test]
async fn test_oversized_batch_falls_back_to_single_updates() {
    let key = test_key();
    let server = spawn_server(PipelineConfig {
        signing_key: Some(KEY.to_vec()),
        private_key: Some(key.clone()),
        trusted_subnet: None,
    })
    .await;

    let transport = HttpTransport::new(&server.address())
        .unwrap()
        .with_signing_key(KEY)
        .with_public_key(key.public_key());
    let metrics = large_sample();

    assert_matches!(
        transport.send_batch(&metrics).await,
        Err(TransportError::ExceedsCipherCapacity { .. })
    );

    deliver(&transport, &metrics).await;

    assert_eq!(stored_count(server.storage.as_ref()).await, metrics.len());
    assert_eq!(
        server.storage.get_gauge("metric_010").await.unwrap(),
        10.0 * 1.25 + 0.1
    );
}

#[tokio::test]
async fn test_untrusted_caller_is_forbidden() {
    let server = spawn_server(PipelineConfig {
        trusted_subnet: Some("10.0.0.0/8".parse().unwrap()),
        ..Default::default()
    })
    .await;
    let client = reqwest::Client::new();

    let peer = client
        .post(server.url("/update/gauge/g1/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(peer.status(), StatusCode::FORBIDDEN);

    let outside = client
        .post(server.url("/update/gauge/g1/1"))
        .header("X-Real-IP", "192.168.0.5")
        .send()
        .await
        .unwrap();
    assert_eq!(outside.status(), StatusCode::FORBIDDEN);

    let garbage = client
        .post(server.url("/update/gauge/g1/1"))
        .header("X-Real-IP", "not-an-ip")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);

    assert_eq!(stored_count(server.storage.as_ref()).await, 0);

    let inside = client
        .post(server.url("/update/gauge/g1/1"))
        .header("X-Forwarded-For", "10.1.2.3, 172.16.0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(inside.status(), StatusCode::OK);

    let read = client.get(server.url("/value/gauge/g1")).send().await.unwrap();
    assert_eq!(read.status(), StatusCode::OK);
}
