//! HTTP API of the metrics server
//!
//! ## Endpoints
//!
//! - `POST /update/{type}/{name}/{value}` - Single metric from path segments
//! - `POST /update/` - Single metric as JSON
//! - `POST /updates/` - JSON batch
//! - `GET /value/{type}/{name}` - Plain-text value
//! - `POST /value/` - Metric lookup as JSON
//! - `GET /` - HTML listing of every metric
//! - `GET /ping` - Storage reachability
//!
//! ## Request pipeline
//!
//! Responses are gzip-compressed for clients that accept it. Write routes
//! run through subnet authorization, signature verification, decryption and
//! decompression, in that order; read routes only through the last two.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use ipnet::IpNet;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::crypto::PrivateKey;

/// Optional security stages of the request pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// HMAC key for `HashSHA256` verification
    pub signing_key: Option<Vec<u8>>,

    /// Key for `Content-Encrypted` bodies
    pub private_key: Option<PrivateKey>,

    /// Only callers inside this network may write
    pub trusted_subnet: Option<IpNet>,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "localhost:8080")
    pub bind_addr: String,

    pub pipeline: PipelineConfig,
}

/// Build the router with all routes and pipeline stages.
pub fn router(state: ApiState, pipeline: &PipelineConfig) -> Router {
    let decrypt = pipeline.private_key.clone().map(Arc::new);

    let mut writes = Router::new()
        .route(
            "/update/:kind/:name/:value",
            post(routes::update::update_from_path),
        )
        .route("/update/", post(routes::update::update_from_json))
        .route("/updates/", post(routes::update::update_batch))
        .route_layer(from_fn(middleware::decompress::decompress_request));

    if let Some(key) = &decrypt {
        writes = writes.route_layer(from_fn_with_state(
            key.clone(),
            middleware::decrypt::decrypt_request,
        ));
    }

    if let Some(key) = &pipeline.signing_key {
        writes = writes.route_layer(from_fn_with_state(
            Arc::<[u8]>::from(key.as_slice()),
            middleware::signature::verify_signature,
        ));
    }

    if let Some(subnet) = pipeline.trusted_subnet {
        writes = writes.route_layer(from_fn_with_state(
            subnet,
            middleware::subnet::authorize_subnet,
        ));
    }

    let mut reads = Router::new()
        .route("/", get(routes::value::list_metrics))
        .route("/value/:kind/:name", get(routes::value::get_value))
        .route("/value/", post(routes::value::value_from_json))
        .route("/ping", get(routes::health::ping))
        .route_layer(from_fn(middleware::decompress::decompress_request));

    if let Some(key) = decrypt {
        reads = reads.route_layer(from_fn_with_state(
            key,
            middleware::decrypt::decrypt_request,
        ));
    }

    writes.merge(reads).with_state(state).layer(
        ServiceBuilder::new()
            .layer(CompressionLayer::new())
            .layer(TraceLayer::new_for_http()),
    )
}

/// Serve `app` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await
}

/// Spawn the API server
///
/// Binds the listener, starts serving in a background task and returns the
/// bound address together with the task handle.
pub async fn spawn_api_server(
    config: ApiConfig,
    state: ApiState,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let app = router(state, &config.pipeline);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, app, cancel).await {
            error!("API server error: {}", e);
        }
    });

    Ok((addr, handle))
}
