use std::{net::SocketAddr, sync::Arc};

use axum::{response::IntoResponse, routing::get, Extension, Json, Router};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{config::Config, error::Error, hub::Hub, relay::Relay, source::Connect, websocket};

/// What a running server tells whoever started it.
#[derive(Debug, Clone)]
pub struct Running {
    /// The port the server is listening on.
    pub port: u16,

    /// The hub the server fans events out with.
    pub hub: Hub,
}

async fn run(
    config: Config,
    connector: Arc<dyn Connect>,
    started: Option<oneshot::Sender<Running>>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    config.validate()?;

    let hub = Hub::new(config.session_queue_capacity);

    let app = Router::new()
        .route("/", get(websocket::ws_handler))
        .route("/ws", get(websocket::ws_handler))
        .route("/config", get(show_config))
        .route("/version", get(show_version))
        .route("/stats", get(show_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Each websocket needs to be able to reach the hub
                .layer(Extension(hub.clone()))
                // The config should be known to the web server
                .layer(Extension(config.clone())),
        );

    let addr = config.socket_addr();
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| Error::Bind {
            addr,
            problem: e.to_string(),
        })?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    info!("listening on {}", addr);

    // Only start reading the device once we know we can serve it.
    let relay = Relay::new(
        connector,
        config.detector(),
        hub.clone(),
        config.reconnect.backoff(),
    );
    let relay_handle = tokio::spawn(relay.run(shutdown.child_token()));
    let hub_handle = hub.clone();

    if let Some(started) = started {
        if started
            .send(Running {
                port: addr.port(),
                hub,
            })
            .is_err()
        {
            warn!("Nobody wanted to know the server started");
        }
    }

    let server_shutdown = shutdown.clone();
    let result = server
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Serve(e.to_string()));

    // The relay and the sessions go down with the server.
    shutdown.cancel();
    let closed = hub_handle.close_all();
    debug!(%closed, "Closed sessions");

    match relay_handle.await {
        Ok(stats) => debug!(?stats, "Relay joined"),
        Err(e) => warn!("Relay task join error: {e:?}"),
    }

    result
}

async fn run_configured(
    config: Config,
    started: Option<oneshot::Sender<Running>>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    config.validate()?;
    let connector = config.connector()?;

    run(config, connector, started, shutdown).await
}

/// Start the server as configured, reading from the configured source.
/// Runs until `shutdown` is cancelled.
pub async fn run_from_config(config: Config, shutdown: CancellationToken) -> Result<(), Error> {
    run_configured(config, None, shutdown).await
}

/// Like [`run_from_config`], but information about the running server
/// is sent on `started` once it is listening.
pub async fn run_from_config_any_port(
    config: Config,
    started: oneshot::Sender<Running>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    run_configured(config, Some(started), shutdown).await
}

/// Start the server with the given source of records.
/// Information about the running server is sent on `started` once it is listening.
///
/// Use port 0 in the configuration to get an arbitrary available port.
pub async fn run_with_connector(
    config: Config,
    connector: Arc<dyn Connect>,
    started: oneshot::Sender<Running>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    run(config, connector, Some(started), shutdown).await
}

async fn show_config(Extension(config): Extension<Config>) -> impl IntoResponse {
    match config.serialize_pretty() {
        Ok(config) => config,
        Err(e) => e.to_string(),
    }
}

async fn show_version() -> impl IntoResponse {
    format!("Pedal Relay v{}\n", env!("CARGO_PKG_VERSION"))
}

async fn show_stats(Extension(hub): Extension<Hub>) -> impl IntoResponse {
    Json(hub.stats())
}
