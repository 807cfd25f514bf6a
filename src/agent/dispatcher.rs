//! Snapshot delivery pipeline.
//!
//! ```text
//! report tick → Dispatcher::submit → bounded channel → N workers → Transport
//!                                                          │
//!                         ExceedsCipherCapacity ───────────┴──→ Transport::send (per metric)
//! ```
//!
//! A full channel blocks `submit`, which holds back the reporting task
//! instead of buffering snapshots without limit.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::MetricSet;
use crate::transport::{Transport, TransportError};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("dispatcher is shutting down")]
    Closed,
}

pub struct Dispatcher {
    sender: mpsc::Sender<MetricSet>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start `workers` delivery tasks draining a queue of `capacity` snapshots.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        workers: usize,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    transport.clone(),
                    receiver.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Self {
            sender,
            cancel,
            workers,
        }
    }

    /// Queue a snapshot, waiting while the queue is full.
    pub async fn submit(&self, metrics: MetricSet) -> Result<(), DispatchError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DispatchError::Closed),
            sent = self.sender.send(metrics) => sent.map_err(|_| DispatchError::Closed),
        }
    }

    /// Close the queue and wait for every worker to finish.
    ///
    /// Snapshots still queued are delivered unless the cancellation token
    /// has fired.
    pub async fn shutdown(self) {
        drop(self.sender);

        for handle in self.workers {
            if let Err(e) = handle.await {
                error!("dispatch worker failed: {e}");
            }
        }
    }
}

async fn worker(
    id: usize,
    transport: Arc<dyn Transport>,
    receiver: Arc<Mutex<mpsc::Receiver<MetricSet>>>,
    cancel: CancellationToken,
) {
    debug!("dispatch worker {id} started");

    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                metrics = receiver.recv() => metrics,
            }
        };

        let Some(metrics) = next else {
            break;
        };

        deliver(transport.as_ref(), &metrics).await;
    }

    debug!("dispatch worker {id} stopped");
}

/// Send one snapshot, downgrading to per-metric delivery when the batch is
/// too large to encrypt. Other failures drop the snapshot; the next report
/// carries the current state again.
#[instrument(skip_all, fields(count = metrics.len()))]
pub async fn deliver(transport: &dyn Transport, metrics: &MetricSet) {
    match transport.send_batch(metrics).await {
        Ok(()) => debug!("batch delivered"),
        Err(TransportError::ExceedsCipherCapacity { size, capacity }) => {
            warn!(
                "batch of {size} bytes exceeds cipher capacity of {capacity} bytes, \
                 falling back to per-metric requests (values travel in the URL path)"
            );
            if let Err(e) = transport.send(metrics).await {
                error!("per-metric delivery failed, dropping snapshot: {e}");
            }
        }
        Err(e) => error!("failed to deliver batch, dropping snapshot: {e}"),
    }
}
