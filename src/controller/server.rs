//! # HTTP Server
//!
//! Metrics, liveness and readiness endpoints.
//!
//! - `/metrics`: Prometheus text format
//! - `/healthz`: liveness, proxies the store health check
//! - `/readyz`: readiness, requires the ready flag plus store readiness (reachable and authenticated)

use crate::observability::metrics::REGISTRY;
use crate::provider::SecretStoreProvider;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
    pub store: Arc<dyn SecretStoreProvider>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("is_ready", &self.is_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ServerState {
    pub fn new(store: Arc<dyn SecretStoreProvider>) -> Self {
        Self {
            is_ready: Arc::new(AtomicBool::new(false)),
            store,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::Relaxed);
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server stops.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if !state.is_ready.load(Ordering::Relaxed) {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready".to_string());
    }
    match state.store.readiness_check().await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}
