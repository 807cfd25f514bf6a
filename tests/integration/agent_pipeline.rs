//! Integration tests for the agent runtime
//!
//! These tests verify that:
//! - A running agent polls, reports and delivers to a live server
//! - Shutdown returns promptly once the root token is cancelled

use std::sync::Arc;
use std::time::Duration;

use metrics_relay::{
    agent::{self, AgentSettings, Collector, collector::{POLL_COUNT, RANDOM_VALUE}},
    api::PipelineConfig,
    transport::{HttpTransport, Transport},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::{spawn_server, test_key};

fn fast_settings() -> AgentSettings {
    AgentSettings {
        poll_interval: Duration::from_millis(20),
        report_interval: Duration::from_millis(100),
        rate_limit: 2,
        queue_capacity: 8,
    }
}

#[tokio::test]
async fn test_agent_reports_to_server() {
    let key = test_key();
    let server = spawn_server(PipelineConfig {
        signing_key: Some(b"agent-key".to_vec()),
        private_key: Some(key.clone()),
        trusted_subnet: Some("127.0.0.0/8".parse().unwrap()),
    })
    .await;

    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(&server.address())
            .unwrap()
            .with_signing_key(b"agent-key".as_slice())
            .with_public_key(key.public_key()),
    );
    let collector = Arc::new(Collector::new());
    let cancel = CancellationToken::new();

    let agent = tokio::spawn(agent::run(
        collector.clone(),
        transport,
        fast_settings(),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(600)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), agent)
        .await
        .expect("agent did not stop")
        .unwrap();

    let stored = server.storage.get_all_metrics().await;
    assert!(stored.counters.get(POLL_COUNT).is_some_and(|count| *count > 0));
    assert!(stored.gauges.contains_key(RANDOM_VALUE));
    assert!(stored.gauges.contains_key("TotalMemory"));
}

#[tokio::test]
async fn test_agent_stops_without_server() {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new("127.0.0.1:1").unwrap());
    let cancel = CancellationToken::new();

    let agent = tokio::spawn(agent::run(
        Arc::new(Collector::new()),
        transport,
        fast_settings(),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(250)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), agent)
        .await
        .expect("agent did not stop")
        .unwrap();
}
