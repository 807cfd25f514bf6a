//! gRPC surface of the server (`metrics.v1.MetricsService`).
//!
//! The generated client is used by `transport::GrpcTransport`, the server
//! side is implemented in [`server`].

pub mod proto;
pub mod server;

include!(concat!(env!("OUT_DIR"), "/metrics.v1.MetricsService.rs"));

pub use metrics_service_client::MetricsServiceClient;
pub use metrics_service_server::{MetricsService, MetricsServiceServer};
pub use server::{MetricsGrpcService, serve};
