//! Management HTTP surface: Prometheus metrics and health probes.
//!
//! Read-only consumers of the core: the metric registry and the mapping
//! store size. Runs on its own port so the proxy listener never serves
//! management traffic.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};

use keymask_core::metrics::Metrics;
use keymask_storage::MappingStore;

/// Shared state for the management handlers.
struct ManagementState {
    metrics: Arc<Metrics>,
    store: Arc<dyn MappingStore>,
    started: Instant,
    version: &'static str,
}

/// Management server: `/metrics`, `/health`, `/ready`, `/live`.
pub struct ManagementServer {
    router: Router,
    port: u16,
}

impl ManagementServer {
    pub fn new(
        metrics: Arc<Metrics>,
        store: Arc<dyn MappingStore>,
        metrics_endpoint: &str,
        port: u16,
        version: &'static str,
    ) -> Self {
        let state = Arc::new(ManagementState {
            metrics,
            store,
            started: Instant::now(),
            version,
        });

        let router = Router::new()
            .route(metrics_endpoint, get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/live", get(live_handler))
            .with_state(state);

        Self { router, port }
    }

    /// Serves until the process exits.
    pub async fn run(self) -> std::io::Result<()> {
        let listener =
            tokio::net::TcpListener::bind(("0.0.0.0", self.port)).await?;
        tracing::info!(port = self.port, "management server listening");
        axum::serve(listener, self.router).await
    }

    /// The router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn metrics_handler(State(state): State<Arc<ManagementState>>) -> impl IntoResponse {
    // Keep the gauge fresh for scrapes even if the periodic tick lags.
    state
        .metrics
        .mapping_store_size
        .set(state.store.size().await as i64);

    let mut buf = Vec::new();
    match TextEncoder::new().encode(&state.metrics.registry.gather(), &mut buf) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buf,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_handler(State(state): State<Arc<ManagementState>>) -> impl IntoResponse {
    let uptime = state.started.elapsed();
    Json(serde_json::json!({
        "status": "healthy",
        "version": state.version,
        "uptime_secs": uptime.as_secs(),
        "mapping_store_size": state.store.size().await,
    }))
}

async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}

async fn live_handler() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use keymask_storage::MemoryStore;

    fn server() -> ManagementServer {
        ManagementServer::new(
            Arc::new(Metrics::new()),
            Arc::new(MemoryStore::new(Duration::from_secs(60))),
            "/metrics",
            0,
            "test",
        )
    }

    #[tokio::test]
    async fn health_reports_store_size() {
        let metrics = Arc::new(Metrics::new());
        let store: Arc<dyn MappingStore> =
            Arc::new(MemoryStore::new(Duration::from_secs(60)));
        store.store("__SECRET_abc12345__", "x").await.unwrap();

        let state = Arc::new(ManagementState {
            metrics,
            store,
            started: Instant::now(),
            version: "test",
        });
        let response = health_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_prometheus_text() {
        let metrics = Arc::new(Metrics::new());
        metrics.secrets_replaced_total.inc();
        let state = Arc::new(ManagementState {
            metrics,
            store: Arc::new(MemoryStore::new(Duration::from_secs(60))),
            started: Instant::now(),
            version: "test",
        });

        let response = metrics_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn server_builds_with_default_routes() {
        let server = server();
        let _router = server.router();
    }
}
