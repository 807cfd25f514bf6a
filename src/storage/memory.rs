//! In-memory storage backend with optional JSON snapshot file
//!
//! All state lives behind a single mutex, so writes are applied one at a
//! time. When a snapshot path is configured the state can be flushed to
//! and restored from disk; flushing happens either after every write
//! (synchronous mode) or from a periodic background task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::backend::{MetricSnapshot, StorageEngine};
use super::error::{StorageError, StorageResult};
use crate::retry::RetryExecutor;
use crate::{Metric, MetricKind, MetricValue};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MetricSnapshot>,
    snapshot_path: Option<PathBuf>,
    sync_flush: bool,
    retry: RetryExecutor,
}

impl MemoryStore {
    /// Volatile store without a snapshot file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a snapshot file at `path`.
    ///
    /// With `sync_flush` every successful write is persisted before the call
    /// returns. File operations that fail transiently go through `retry`.
    pub fn with_snapshot(path: impl Into<PathBuf>, sync_flush: bool, retry: RetryExecutor) -> Self {
        Self {
            state: Mutex::new(MetricSnapshot::default()),
            snapshot_path: Some(path.into()),
            sync_flush,
            retry,
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> MetricSnapshot {
        self.state.lock().await.clone()
    }

    /// Write the full state to the snapshot file.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> StorageResult<()> {
        let state = self.state.lock().await;
        self.write_snapshot(&state).await
    }

    /// Replace the in-memory state with the snapshot file's content.
    ///
    /// A missing file leaves the state untouched.
    #[instrument(skip(self))]
    pub async fn load(&self) -> StorageResult<()> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };

        let mut state = self.state.lock().await;

        let read = self
            .retry
            .run(|| async move { tokio::fs::read(path).await.map_err(StorageError::from) })
            .await
            .map_err(StorageError::from);

        let content = match read {
            Ok(content) => content,
            Err(StorageError::IoError(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no snapshot at {}, starting empty", path.display());
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let restored: MetricSnapshot = serde_json::from_slice(&content)?;
        info!(
            "restored {} gauges and {} counters from {}",
            restored.gauges.len(),
            restored.counters.len(),
            path.display()
        );
        *state = restored;

        Ok(())
    }

    /// Startup form of [`load`](Self::load). An unreadable or corrupt
    /// snapshot is logged and the store starts empty.
    pub async fn restore(&self) {
        if let Err(e) = self.load().await {
            error!("could not restore metrics snapshot, starting empty: {e}");
        }
    }

    /// Flush on a fixed interval until `cancel` fires.
    ///
    /// Failures are logged and never reach callers.
    pub fn spawn_periodic_save(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            error!("failed to save metrics snapshot: {e}");
                        }
                    }
                }
            }

            debug!("periodic snapshot saver stopped");
        })
    }

    async fn write_snapshot(&self, state: &MetricSnapshot) -> StorageResult<()> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };

        let content = serde_json::to_vec_pretty(state)?;
        let content = content.as_slice();

        self.retry
            .run(|| async move {
                tokio::fs::write(path, content)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;

        debug!("wrote {} metrics to {}", state.len(), path.display());
        Ok(())
    }

    async fn persist_if_sync(&self, state: &MetricSnapshot) -> StorageResult<()> {
        if self.sync_flush {
            self.write_snapshot(state).await?;
        }
        Ok(())
    }
}

fn add_counter(state: &mut MetricSnapshot, name: &str, delta: i64) -> StorageResult<()> {
    let slot = state.counters.entry(name.to_string()).or_insert(0);
    *slot = slot
        .checked_add(delta)
        .ok_or_else(|| StorageError::Validation(format!("counter {name} would overflow")))?;
    Ok(())
}

#[async_trait]
impl StorageEngine for MemoryStore {
    async fn save_gauge(&self, name: &str, value: f64) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        state.gauges.insert(name.to_string(), value);
        self.persist_if_sync(&state).await
    }

    async fn save_counter(&self, name: &str, delta: i64) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        add_counter(&mut state, name, delta)?;
        self.persist_if_sync(&state).await
    }

    async fn get_gauge(&self, name: &str) -> StorageResult<f64> {
        self.state
            .lock()
            .await
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    async fn get_counter(&self, name: &str) -> StorageResult<i64> {
        self.state
            .lock()
            .await
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    async fn get_all_metrics(&self) -> MetricSnapshot {
        self.snapshot().await
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn update_metrics_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        let mut state = self.state.lock().await;

        for metric in metrics {
            match metric.payload() {
                Some(MetricValue::Gauge(value)) => {
                    state.gauges.insert(metric.id.clone(), value);
                }
                Some(MetricValue::Counter(delta)) => {
                    if let Err(e) = add_counter(&mut state, &metric.id, delta) {
                        warn!("skipping batch item: {e}");
                    }
                }
                None => warn!(
                    "skipping {} {} without a payload",
                    metric.kind, metric.id
                ),
            }
        }

        self.persist_if_sync(&state).await
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store");
        self.flush().await
    }
}
