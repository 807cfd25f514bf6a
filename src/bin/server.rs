use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_relay::{
    api::{self, ApiConfig, ApiState},
    config::{ServerArgs, ServerConfig},
    grpc,
    retry::RetryExecutor,
    storage::{StorageEngine, memory::MemoryStore},
    util::{build_info, shutdown_signal},
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_relay", LevelFilter::DEBUG),
        ("metrics_server", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = ServerArgs::parse();
    info!("{}", build_info("metrics-server"));
    trace!("started with args: {args:?}");

    let config = ServerConfig::resolve(&args)?;
    let pipeline = config.pipeline()?;
    let stop = shutdown_signal().context("could not listen for shutdown signals")?;

    let cancel = CancellationToken::new();
    let retry = RetryExecutor::new(Default::default(), cancel.child_token());

    let (storage, saver) = open_storage(&config, retry, &cancel).await?;

    let (addr, http) = api::spawn_api_server(
        ApiConfig {
            bind_addr: config.listen_address(),
            pipeline,
        },
        ApiState::new(storage.clone()),
        cancel.clone(),
    )
    .await?;
    info!("accepting metrics on http://{addr}");

    let rpc = match config.grpc_listen_address() {
        Some(address) => {
            let listener = TcpListener::bind(&address)
                .await
                .with_context(|| format!("could not bind gRPC listener on {address}"))?;
            let storage = storage.clone();
            let cancel = cancel.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = grpc::serve(listener, storage, cancel).await {
                    error!("gRPC server error: {e}");
                }
            }))
        }
        None => None,
    };

    let signal = stop.await;
    info!("received {signal}, shutting down");
    cancel.cancel();

    if let Err(e) = http.await {
        error!("{e}");
    }
    if let Some(rpc) = rpc
        && let Err(e) = rpc.await
    {
        error!("{e}");
    }
    if let Some(saver) = saver
        && let Err(e) = saver.await
    {
        error!("{e}");
    }

    storage.close().await.context("could not close storage")?;
    info!("stopped");

    Ok(())
}

/// Pick the backend: a database DSN wins over the snapshot file.
async fn open_storage(
    config: &ServerConfig,
    retry: RetryExecutor,
    cancel: &CancellationToken,
) -> anyhow::Result<(Arc<dyn StorageEngine>, Option<JoinHandle<()>>)> {
    if let Some(dsn) = &config.database_dsn {
        return open_relational(dsn, retry).await.map(|store| (store, None));
    }

    let Some(path) = config.snapshot_path() else {
        info!("using in-memory storage without snapshots");
        let store: Arc<dyn StorageEngine> = Arc::new(MemoryStore::new());
        return Ok((store, None));
    };

    let interval = config.store_interval();
    let store = Arc::new(MemoryStore::with_snapshot(
        path.clone(),
        interval.is_zero(),
        retry,
    ));

    if config.restore {
        store.restore().await;
    }

    let saver = (!interval.is_zero()).then(|| store.spawn_periodic_save(interval, cancel.clone()));
    info!(
        "using in-memory storage with snapshots in {} every {:?}",
        path.display(),
        interval
    );

    let store: Arc<dyn StorageEngine> = store;
    Ok((store, saver))
}

#[cfg(feature = "storage-sqlite")]
async fn open_relational(
    dsn: &str,
    retry: RetryExecutor,
) -> anyhow::Result<Arc<dyn StorageEngine>> {
    use metrics_relay::storage::sqlite::RelationalStore;

    let store = RelationalStore::connect(dsn, retry)
        .await
        .context("could not open database")?;
    info!("using relational storage");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "storage-sqlite"))]
async fn open_relational(
    _dsn: &str,
    _retry: RetryExecutor,
) -> anyhow::Result<Arc<dyn StorageEngine>> {
    anyhow::bail!("a database DSN was given but the storage-sqlite feature is disabled")
}
