//! Conversion between agent snapshots, the JSON wire batch and the
//! plain-text values used by the path-based endpoints, plus the gzip
//! framing shared by both ends of the HTTP transport.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;

use crate::{Metric, MetricKind, MetricSet, MetricValue};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unknown metric type: {0}")]
    UnknownKind(String),

    #[error("metric id must not be empty")]
    EmptyId,

    #[error("invalid {kind} value: {raw}")]
    InvalidValue { kind: MetricKind, raw: String },

    #[error("metric {0} has no payload for its type")]
    MissingPayload(String),

    #[error("gauge {0} is not a finite number")]
    NonFinite(String),
}

/// Encode an agent snapshot as a wire batch, ordered by id.
pub fn encode_batch(metrics: &MetricSet) -> Vec<Metric> {
    let mut batch: Vec<Metric> = metrics
        .iter()
        .map(|(id, value)| value.into_metric(id.clone()))
        .collect();
    batch.sort_by(|a, b| a.id.cmp(&b.id));
    batch
}

/// Serialize an agent snapshot to the JSON batch body.
pub fn encode_batch_json(metrics: &MetricSet) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&encode_batch(metrics))
}

/// Validate a single wire metric and return its typed payload.
pub fn validate(metric: &Metric) -> Result<MetricValue, ValidationError> {
    if metric.id.is_empty() {
        return Err(ValidationError::EmptyId);
    }

    match metric.payload() {
        Some(MetricValue::Gauge(value)) if !value.is_finite() => {
            Err(ValidationError::NonFinite(metric.id.clone()))
        }
        Some(payload) => Ok(payload),
        None => Err(ValidationError::MissingPayload(metric.id.clone())),
    }
}

/// Parse the textual value of a path-based update.
pub fn parse_value(kind: MetricKind, raw: &str) -> Result<MetricValue, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        kind,
        raw: raw.to_string(),
    };

    match kind {
        MetricKind::Gauge => {
            let value: f64 = raw.parse().map_err(|_| invalid())?;
            if !value.is_finite() {
                return Err(invalid());
            }
            Ok(MetricValue::Gauge(value))
        }
        MetricKind::Counter => raw.parse().map(MetricValue::Counter).map_err(|_| invalid()),
    }
}

/// Leading bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}
