//! Storage reachability check

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use axum::extract::State;

/// GET /ping
pub async fn ping(State(state): State<ApiState>) -> ApiResult<&'static str> {
    state.storage.ping().await?;
    Ok("OK")
}
