//! Agent-side delivery of metric snapshots to the server.
//!
//! Two implementations share the `Transport` trait:
//!
//! - `HttpTransport`: gzip, optional RSA encryption, optional HMAC signature
//! - `GrpcTransport`: binary RPC, no payload-level security

pub mod grpc;
pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::MetricSet;
use crate::crypto::CryptoError;

pub use grpc::GrpcTransport;
pub use http::HttpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The compressed batch does not fit one encryption operation.
    #[error("compressed batch of {size} bytes exceeds cipher capacity of {capacity} bytes")]
    ExceedsCipherCapacity { size: usize, capacity: usize },

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("server responded with {status}")]
    Status { status: u16 },

    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("grpc connection failed: {0}")]
    Connect(#[from] tonic::transport::Error),
}

/// Delivery of agent snapshots.
///
/// `send_batch` ships the whole snapshot in one request. `send` is the
/// per-metric path used when a batch cannot be shipped as a unit.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_batch(&self, metrics: &MetricSet) -> Result<(), TransportError>;

    async fn send(&self, metrics: &MetricSet) -> Result<(), TransportError>;
}
