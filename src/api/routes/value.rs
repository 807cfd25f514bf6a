//! Metric read endpoints

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::Html,
};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::{Metric, MetricKind};

/// GET /value/{type}/{name}
pub async fn get_value(
    State(state): State<ApiState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    let value = state.storage.get(kind, &name).await?;
    Ok(value.to_string())
}

/// Body of POST /value/; payload fields are ignored if present.
#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

/// POST /value/
pub async fn value_from_json(
    State(state): State<ApiState>,
    payload: Result<Json<MetricQuery>, JsonRejection>,
) -> ApiResult<Json<Metric>> {
    let Json(query) = payload?;
    if query.id.is_empty() {
        return Err(ApiError::InvalidRequest("metric id is required".to_string()));
    }

    let value = state.storage.get(query.kind, &query.id).await?;
    Ok(Json(value.into_metric(query.id)))
}

/// GET /
///
/// HTML table of every stored metric.
pub async fn list_metrics(State(state): State<ApiState>) -> Html<String> {
    let snapshot = state.storage.get_all_metrics().await;

    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Metrics</title></head>\n<body>\n\
         <table>\n<tr><th>Name</th><th>Type</th><th>Value</th></tr>\n",
    );

    for metric in snapshot.to_metrics() {
        let value = metric
            .payload()
            .map(|value| value.to_string())
            .unwrap_or_default();
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&metric.id),
            metric.kind,
            value
        ));
    }

    page.push_str("</table>\n</body>\n</html>\n");
    Html(page)
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
        assert_eq!(escape_html("Alloc"), "Alloc");
    }
}
