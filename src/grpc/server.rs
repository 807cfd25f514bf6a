//! `MetricsService` implementation backed by a `StorageEngine`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use super::metrics_service_server::{MetricsService, MetricsServiceServer};
use super::proto;
use crate::codec::validate;
use crate::storage::{StorageEngine, StorageError};
use crate::{Metric, MetricKind, MetricValue};

pub struct MetricsGrpcService {
    storage: Arc<dyn StorageEngine>,
}

impl MetricsGrpcService {
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self { storage }
    }

    pub fn into_server(self) -> MetricsServiceServer<Self> {
        MetricsServiceServer::new(self)
    }

    async fn stored(&self, kind: MetricKind, id: &str) -> Result<proto::Metric, Status> {
        let value = self.storage.get(kind, id).await.map_err(status_from)?;
        Ok(proto::Metric::from(&value.into_metric(id)))
    }
}

fn status_from(err: StorageError) -> Status {
    match err {
        StorageError::NotFound(what) => Status::not_found(format!("metric not found: {what}")),
        StorageError::Validation(msg) => Status::invalid_argument(msg),
        other => Status::internal(other.to_string()),
    }
}

/// Convert and validate one incoming metric.
fn checked(metric: proto::Metric) -> Result<(Metric, MetricValue), Status> {
    let metric = Metric::try_from(metric).map_err(|e| Status::invalid_argument(e.to_string()))?;
    let payload = validate(&metric).map_err(|e| Status::invalid_argument(e.to_string()))?;
    Ok((metric, payload))
}

#[tonic::async_trait]
impl MetricsService for MetricsGrpcService {
    #[instrument(skip_all)]
    async fn update_metric(
        &self,
        request: Request<proto::UpdateMetricRequest>,
    ) -> Result<Response<proto::UpdateMetricResponse>, Status> {
        let metric = request
            .into_inner()
            .metric
            .ok_or_else(|| Status::invalid_argument("metric is required"))?;
        let (metric, payload) = checked(metric)?;

        self.storage
            .save(&metric.id, payload)
            .await
            .map_err(status_from)?;

        let stored = self.stored(metric.kind, &metric.id).await?;
        Ok(Response::new(proto::UpdateMetricResponse {
            metric: Some(stored),
        }))
    }

    #[instrument(skip_all)]
    async fn update_metrics(
        &self,
        request: Request<proto::UpdateMetricsRequest>,
    ) -> Result<Response<proto::UpdateMetricsResponse>, Status> {
        let metrics = request.into_inner().metrics;
        if metrics.is_empty() {
            return Err(Status::invalid_argument("batch must not be empty"));
        }

        let batch = metrics
            .into_iter()
            .map(|metric| checked(metric).map(|(metric, _)| metric))
            .collect::<Result<Vec<_>, _>>()?;

        self.storage
            .update_metrics_batch(&batch)
            .await
            .map_err(status_from)?;

        Ok(Response::new(proto::UpdateMetricsResponse {}))
    }

    async fn get_metric(
        &self,
        request: Request<proto::GetMetricRequest>,
    ) -> Result<Response<proto::GetMetricResponse>, Status> {
        let request = request.into_inner();
        if request.id.is_empty() {
            return Err(Status::invalid_argument("metric id is required"));
        }
        let kind: MetricKind = request
            .r#type
            .parse()
            .map_err(|e: crate::ValidationError| Status::invalid_argument(e.to_string()))?;

        let metric = self.stored(kind, &request.id).await?;
        Ok(Response::new(proto::GetMetricResponse {
            metric: Some(metric),
        }))
    }

    async fn get_all_metrics(
        &self,
        _request: Request<proto::GetAllMetricsRequest>,
    ) -> Result<Response<proto::GetAllMetricsResponse>, Status> {
        let metrics = self
            .storage
            .get_all_metrics()
            .await
            .to_metrics()
            .iter()
            .map(proto::Metric::from)
            .collect();

        Ok(Response::new(proto::GetAllMetricsResponse { metrics }))
    }

    async fn ping(
        &self,
        _request: Request<proto::PingRequest>,
    ) -> Result<Response<proto::PingResponse>, Status> {
        let healthy = match self.storage.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("storage ping failed: {e}");
                false
            }
        };

        Ok(Response::new(proto::PingResponse { healthy }))
    }
}

/// Serve the gRPC API on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    storage: Arc<dyn StorageEngine>,
    cancel: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!("gRPC server listening on {addr:?}");

    tonic::transport::Server::builder()
        .add_service(MetricsGrpcService::new(storage).into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), cancel.cancelled_owned())
        .await
}
