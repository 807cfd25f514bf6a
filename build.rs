//! Generates the gRPC service glue for `metrics.v1.MetricsService`.
//!
//! Message types live in `src/grpc/proto.rs` as prost derives, so no
//! `protoc` is needed at build time.

fn method(
    name: &str,
    route: &str,
    input: &str,
    output: &str,
) -> tonic_build::manual::Method {
    tonic_build::manual::Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::grpc::proto::{input}"))
        .output_type(format!("crate::grpc::proto::{output}"))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    let service = tonic_build::manual::Service::builder()
        .name("MetricsService")
        .package("metrics.v1")
        .method(method(
            "update_metric",
            "UpdateMetric",
            "UpdateMetricRequest",
            "UpdateMetricResponse",
        ))
        .method(method(
            "update_metrics",
            "UpdateMetrics",
            "UpdateMetricsRequest",
            "UpdateMetricsResponse",
        ))
        .method(method(
            "get_metric",
            "GetMetric",
            "GetMetricRequest",
            "GetMetricResponse",
        ))
        .method(method(
            "get_all_metrics",
            "GetAllMetrics",
            "GetAllMetricsRequest",
            "GetAllMetricsResponse",
        ))
        .method(method("ping", "Ping", "PingRequest", "PingResponse"))
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}
