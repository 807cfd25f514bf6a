//! gRPC delivery of metric snapshots.
//!
//! No compression, encryption or signing happens here; channel security is
//! expected to be handled outside the application.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, instrument};

use super::{Transport, TransportError};
use crate::MetricSet;
use crate::codec::encode_batch;
use crate::grpc::MetricsServiceClient;
use crate::grpc::proto;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GrpcTransport {
    client: MetricsServiceClient<Channel>,
}

impl GrpcTransport {
    /// Create a client for `address` (`host:port` or URL). The connection is
    /// established on first use.
    pub fn connect_lazy(address: &str) -> Result<Self, TransportError> {
        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };

        let channel = Endpoint::from_shared(uri)?
            .timeout(RPC_TIMEOUT)
            .connect_timeout(RPC_TIMEOUT)
            .connect_lazy();

        Ok(Self {
            client: MetricsServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    #[instrument(skip_all, fields(count = metrics.len()))]
    async fn send_batch(&self, metrics: &MetricSet) -> Result<(), TransportError> {
        if metrics.is_empty() {
            return Ok(());
        }

        let request = proto::UpdateMetricsRequest {
            metrics: encode_batch(metrics).iter().map(proto::Metric::from).collect(),
        };

        self.client.clone().update_metrics(request).await?;
        debug!("batch delivered over gRPC");
        Ok(())
    }

    #[instrument(skip_all, fields(count = metrics.len()))]
    async fn send(&self, metrics: &MetricSet) -> Result<(), TransportError> {
        let mut client = self.client.clone();

        for metric in encode_batch(metrics) {
            client
                .update_metric(proto::UpdateMetricRequest {
                    metric: Some(proto::Metric::from(&metric)),
                })
                .await?;
        }

        Ok(())
    }
}
