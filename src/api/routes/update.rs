//! Metric write endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{debug, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::codec::{parse_value, validate};
use crate::{Metric, MetricKind};

/// POST /update/{type}/{name}/{value}
#[instrument(skip_all)]
pub async fn update_from_path(
    State(state): State<ApiState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    let value = parse_value(kind, &value)?;

    state.storage.save(&name, value).await?;

    Ok(format!("Metric {name} updated"))
}

/// POST /update/
///
/// Responds with the stored metric; counters carry the accumulated total.
#[instrument(skip_all)]
pub async fn update_from_json(
    State(state): State<ApiState>,
    payload: Result<Json<Metric>, JsonRejection>,
) -> ApiResult<Json<Metric>> {
    let Json(metric) = payload?;
    let value = validate(&metric)?;

    state.storage.save(&metric.id, value).await?;

    let stored = state.storage.get(metric.kind, &metric.id).await?;
    Ok(Json(stored.into_metric(metric.id)))
}

/// POST /updates/
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn update_batch(State(state): State<ApiState>, body: Bytes) -> ApiResult<StatusCode> {
    let batch: Vec<Metric> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid metrics batch: {e}")))?;

    if batch.is_empty() {
        return Err(ApiError::InvalidRequest("empty metrics batch".to_string()));
    }

    state.storage.update_metrics_batch(&batch).await?;

    debug!("applied batch of {} metrics", batch.len());
    Ok(StatusCode::OK)
}
