//! Messages of the `metrics.v1` package.

use crate::{Metric as WireMetric, MetricKind};

#[derive(Clone, PartialEq, prost::Message)]
pub struct Metric {
    #[prost(string, tag = "1")]
    pub id: String,
    /// `"gauge"` or `"counter"`.
    #[prost(string, tag = "2")]
    pub r#type: String,
    #[prost(int64, optional, tag = "3")]
    pub delta: Option<i64>,
    #[prost(double, optional, tag = "4")]
    pub value: Option<f64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricRequest {
    #[prost(message, optional, tag = "1")]
    pub metric: Option<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricResponse {
    /// The stored metric after the update (counters carry the total).
    #[prost(message, optional, tag = "1")]
    pub metric: Option<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricsRequest {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricsResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMetricRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub r#type: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMetricResponse {
    #[prost(message, optional, tag = "1")]
    pub metric: Option<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetAllMetricsRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetAllMetricsResponse {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingResponse {
    #[prost(bool, tag = "1")]
    pub healthy: bool,
}

impl From<&WireMetric> for Metric {
    fn from(metric: &WireMetric) -> Self {
        Self {
            id: metric.id.clone(),
            r#type: metric.kind.as_str().to_string(),
            delta: metric.delta,
            value: metric.value,
        }
    }
}

impl TryFrom<Metric> for WireMetric {
    type Error = crate::ValidationError;

    fn try_from(metric: Metric) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: metric.r#type.parse::<MetricKind>()?,
            id: metric.id,
            delta: metric.delta,
            value: metric.value,
        })
    }
}
