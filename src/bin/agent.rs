use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_relay::{
    agent::{self, Collector},
    config::{AgentArgs, AgentConfig},
    transport::{Transport, grpc::GrpcTransport, http::HttpTransport},
    util::{build_info, shutdown_signal},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_relay", LevelFilter::DEBUG),
        ("metrics_agent", LevelFilter::TRACE),
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
    let args = AgentArgs::parse();
    info!("{}", build_info("metrics-agent"));
    trace!("started with args: {args:?}");

    let config = AgentConfig::resolve(&args)?;
    let transport = build_transport(&config)?;

    let stop = shutdown_signal().context("could not listen for shutdown signals")?;
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let signal = stop.await;
        info!("received {signal}, shutting down");
        shutdown.cancel();
    });

    agent::run(
        Arc::new(Collector::new()),
        transport,
        config.settings(),
        cancel,
    )
    .await;

    info!("stopped");
    Ok(())
}

fn build_transport(config: &AgentConfig) -> anyhow::Result<Arc<dyn Transport>> {
    if let Some(address) = &config.grpc_address {
        info!("reporting to {address} over gRPC");
        let transport = GrpcTransport::connect_lazy(address)
            .with_context(|| format!("invalid gRPC address {address}"))?;
        return Ok(Arc::new(transport));
    }

    let mut transport = HttpTransport::new(&config.address)
        .with_context(|| format!("invalid server address {}", config.address))?;

    if let Some(key) = &config.key {
        transport = transport.with_signing_key(key.as_bytes());
    }
    if let Some(key) = config.public_key()? {
        transport = transport.with_public_key(key);
    }

    info!("reporting to {} over HTTP", config.address);
    Ok(Arc::new(transport))
}
