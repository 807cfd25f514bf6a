pub mod agent;
pub mod api;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod grpc;
pub mod retry;
pub mod storage;
pub mod transport;
pub mod util;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use codec::ValidationError;

/// Kind of a metric: gauges overwrite, counters accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Wire representation of a single metric.
///
/// `value` is present for gauges, `delta` for counters. When read back from
/// storage a counter's `delta` carries the accumulated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Typed payload of this metric, if the field matching its kind is set.
    pub fn payload(&self) -> Option<MetricValue> {
        match self.kind {
            MetricKind::Gauge => self.value.map(MetricValue::Gauge),
            MetricKind::Counter => self.delta.map(MetricValue::Counter),
        }
    }
}

/// Typed metric value used inside the agent and the stores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    pub fn into_metric(self, id: impl Into<String>) -> Metric {
        match self {
            MetricValue::Gauge(value) => Metric::gauge(id, value),
            MetricValue::Counter(delta) => Metric::counter(id, delta),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(value) => write!(f, "{value}"),
            MetricValue::Counter(delta) => write!(f, "{delta}"),
        }
    }
}

/// Point-in-time snapshot produced by the agent collector, keyed by metric id.
pub type MetricSet = HashMap<String, MetricValue>;
