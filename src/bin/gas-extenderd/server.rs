//! HTTP server for the GPU-aware scheduler extender daemon.
//!
//! Two routes carry the scheduler-extender protocol; `/healthz` and
//! `/info` are the ambient operational endpoints every service in this
//! stack carries regardless of what its core does.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use gas_extender::cache::fake::FakeCache;
use gas_extender::config::ExtenderConfig;
use gas_extender::endpoints::{ExtenderArgs, ExtenderBindingArgs, ExtenderService};
use std::sync::Arc;

#[derive(Clone)]
struct ServerState {
    extender: Arc<ExtenderService>,
}

pub async fn run(config: ExtenderConfig) -> anyhow::Result<()> {
    let cache = Arc::new(FakeCache::new());
    let extender = Arc::new(ExtenderService::new(cache.clone(), cache, config.clone()));
    let state = ServerState { extender };

    let app = Router::new()
        .route("/scheduler/filter", post(filter))
        .route("/scheduler/bind", post(bind))
        .route("/healthz", get(healthz))
        .route("/info", get(info))
        .with_state(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn create_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, initiating graceful shutdown");
        }
    }
}

#[axum::debug_handler]
async fn filter(
    State(state): State<ServerState>,
    Json(args): Json<ExtenderArgs>,
) -> impl IntoResponse {
    let result = state.extender.filter_nodes(args).await;
    (StatusCode::OK, Json(result))
}

#[axum::debug_handler]
async fn bind(
    State(state): State<ServerState>,
    Json(args): Json<ExtenderBindingArgs>,
) -> impl IntoResponse {
    let result = state.extender.bind_node(args).await;
    (StatusCode::OK, Json(result))
}

#[axum::debug_handler]
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

#[axum::debug_handler]
async fn info() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({"name": "gas-extenderd", "version": env!("CARGO_PKG_VERSION")})),
    )
}
