//! Agent runtime: poll the host, report snapshots, deliver them.
//!
//! ## Message Flow
//!
//! ```text
//! poll tick   → Collector::poll
//! report tick → Collector::snapshot → Dispatcher → Transport → server
//! ```
//!
//! Both loops and all dispatch workers stop when the root cancellation
//! token fires; `run` returns once every worker has finished.

pub mod collector;
pub mod dispatcher;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::transport::Transport;

pub use collector::Collector;
pub use dispatcher::{DEFAULT_QUEUE_CAPACITY, DispatchError, Dispatcher};

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// Number of concurrent delivery workers.
    pub rate_limit: usize,
    pub queue_capacity: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            rate_limit: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Run the agent until `cancel` fires.
#[instrument(skip_all)]
pub async fn run(
    collector: Arc<Collector>,
    transport: Arc<dyn Transport>,
    settings: AgentSettings,
    cancel: CancellationToken,
) {
    info!(
        "agent started: poll every {:?}, report every {:?}, {} workers",
        settings.poll_interval, settings.report_interval, settings.rate_limit
    );

    let dispatcher = Dispatcher::spawn(
        transport,
        settings.rate_limit,
        settings.queue_capacity,
        cancel.clone(),
    );

    let poller = tokio::spawn(poll_loop(
        collector.clone(),
        settings.poll_interval,
        cancel.clone(),
    ));

    report_loop(&collector, &dispatcher, settings.report_interval, &cancel).await;

    if let Err(e) = poller.await {
        tracing::error!("poll task failed: {e}");
    }
    dispatcher.shutdown().await;

    info!("agent stopped");
}

async fn poll_loop(collector: Arc<Collector>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => collector.poll(),
        }
    }

    debug!("poll loop stopped");
}

async fn report_loop(
    collector: &Collector,
    dispatcher: &Dispatcher,
    every: Duration,
    cancel: &CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately, before anything was polled
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = collector.snapshot();
                trace!("queueing snapshot of {} metrics", snapshot.len());
                if dispatcher.submit(snapshot).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!("report loop stopped");
}
