//! Storage engine trait definition
//!
//! Every backend (in-memory with snapshot file, relational) implements
//! `StorageEngine`; HTTP handlers and the gRPC service only ever see an
//! `Arc<dyn StorageEngine>`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StorageResult;
use crate::{Metric, MetricKind, MetricValue};

/// Full dump of a store. Also the on-disk shape of the snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
}

impl MetricSnapshot {
    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into wire metrics, gauges first, each group ordered by name.
    pub fn to_metrics(&self) -> Vec<Metric> {
        self.gauges
            .iter()
            .map(|(name, value)| Metric::gauge(name.clone(), *value))
            .chain(
                self.counters
                    .iter()
                    .map(|(name, delta)| Metric::counter(name.clone(), *delta)),
            )
            .collect()
    }
}

/// Shared contract of all metric stores.
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// every request handler.
///
/// ## Batch semantics
///
/// `update_metrics_batch` is all-or-nothing on transactional backends and
/// best-effort per item on the memory backend. Items without a payload for
/// their type are skipped (and logged) by both.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Overwrite a gauge.
    async fn save_gauge(&self, name: &str, value: f64) -> StorageResult<()>;

    /// Add `delta` to a counter, creating it at `delta` if absent.
    async fn save_counter(&self, name: &str, delta: i64) -> StorageResult<()>;

    /// Returns `StorageError::NotFound` when the gauge is absent.
    async fn get_gauge(&self, name: &str) -> StorageResult<f64>;

    /// Returns `StorageError::NotFound` when the counter is absent.
    async fn get_counter(&self, name: &str) -> StorageResult<i64>;

    /// Best-effort dump of everything stored. Read failures are logged and
    /// whatever was read successfully is returned.
    async fn get_all_metrics(&self) -> MetricSnapshot;

    async fn update_metrics_batch(&self, metrics: &[Metric]) -> StorageResult<()>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> StorageResult<()>;

    /// Flush pending state and release resources.
    async fn close(&self) -> StorageResult<()>;

    /// Apply a typed value.
    async fn save(&self, name: &str, value: MetricValue) -> StorageResult<()> {
        match value {
            MetricValue::Gauge(value) => self.save_gauge(name, value).await,
            MetricValue::Counter(delta) => self.save_counter(name, delta).await,
        }
    }

    /// Look up a metric by kind and name.
    async fn get(&self, kind: MetricKind, name: &str) -> StorageResult<MetricValue> {
        match kind {
            MetricKind::Gauge => self.get_gauge(name).await.map(MetricValue::Gauge),
            MetricKind::Counter => self.get_counter(name).await.map(MetricValue::Counter),
        }
    }
}
