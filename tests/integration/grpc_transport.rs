//! Integration tests for the gRPC service and transport
//!
//! These tests verify that:
//! - Batches and single updates sent over gRPC land in storage
//! - Lookups map missing metrics and invalid input to the right status codes

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_relay::{
    MetricSet, MetricValue,
    grpc::{self, MetricsServiceClient, proto},
    storage::{StorageEngine, memory::MemoryStore},
    transport::{GrpcTransport, Transport},
};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tonic::Code;

struct GrpcServer {
    addr: SocketAddr,
    storage: Arc<dyn StorageEngine>,
    cancel: CancellationToken,
}

impl Drop for GrpcServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn spawn_grpc() -> GrpcServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let storage: Arc<dyn StorageEngine> = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();

    tokio::spawn(grpc::serve(listener, storage.clone(), cancel.clone()));

    GrpcServer {
        addr,
        storage,
        cancel,
    }
}

#[tokio::test]
async fn test_batch_over_grpc() {
    let server = spawn_grpc().await;
    let transport = GrpcTransport::connect_lazy(&server.addr.to_string()).unwrap();
    let metrics = MetricSet::from([
        ("g1".to_string(), MetricValue::Gauge(1.5)),
        ("c1".to_string(), MetricValue::Counter(3)),
    ]);

    transport.send_batch(&metrics).await.unwrap();
    transport.send_batch(&metrics).await.unwrap();

    assert_eq!(server.storage.get_gauge("g1").await.unwrap(), 1.5);
    assert_eq!(server.storage.get_counter("c1").await.unwrap(), 6);
}

#[tokio::test]
async fn test_single_updates_over_grpc() {
    let server = spawn_grpc().await;
    let transport = GrpcTransport::connect_lazy(&format!("http://{}", server.addr)).unwrap();

    transport
        .send(&MetricSet::from([("PollCount".to_string(), MetricValue::Counter(2))]))
        .await
        .unwrap();

    assert_eq!(server.storage.get_counter("PollCount").await.unwrap(), 2);
}

#[tokio::test]
async fn test_client_lookups() {
    let server = spawn_grpc().await;
    server.storage.save_gauge("Alloc", 7.5).await.unwrap();

    let mut client = MetricsServiceClient::connect(format!("http://{}", server.addr))
        .await
        .unwrap();

    let found = client
        .get_metric(proto::GetMetricRequest {
            id: "Alloc".to_string(),
            r#type: "gauge".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(found.metric.and_then(|m| m.value), Some(7.5));

    let missing = client
        .get_metric(proto::GetMetricRequest {
            id: "missing".to_string(),
            r#type: "gauge".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::NotFound);

    let invalid = client
        .update_metrics(proto::UpdateMetricsRequest { metrics: vec![] })
        .await
        .unwrap_err();
    assert_eq!(invalid.code(), Code::InvalidArgument);

    let healthy = client
        .ping(proto::PingRequest {})
        .await
        .unwrap()
        .into_inner();
    assert!(healthy.healthy);
}
