//! Image rendering API service library.
//!
//! Exposes the router and its state so integration tests can drive the service
//! without binding a socket.

pub mod assets;
pub mod cleanup;
pub mod config;
pub mod fetch;
pub mod handlers;
pub mod memory_pressure;
pub mod metrics;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use card_common::{CardError, CardResult};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use state::AppState;

/// Build the HTTP router. `prometheus` is `None` in tests, where no recorder is
/// installed.
pub fn build_router(state: Arc<AppState>, prometheus: Option<PrometheusHandle>) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    let router = Router::new()
        // Images
        .route("/shop", post(handlers::shop_handler))
        .route("/locker", post(handlers::locker_handler))
        .route("/stats", post(handlers::stats_handler))
        .route("/utils/progressBar", post(handlers::progress_bar_handler))
        .route("/utils/drop", post(handlers::drop_handler))
        .route(
            "/utils/collectGarbage",
            get(handlers::collect_garbage_handler).post(handlers::collect_garbage_handler),
        )
        // Health & metrics
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/metrics", get(handlers::api_metrics_handler))
        // Cache management
        .route("/api/cache/stats", get(handlers::cache_stats_handler))
        .route("/api/cache/clear", post(handlers::cache_clear_handler))
        .layer(Extension(state));

    let router = match prometheus {
        Some(handle) => router.layer(Extension(handle)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

/// Run CPU-bound work (decoding, drawing, encoding) on the blocking pool.
pub async fn run_blocking<T, F>(work: F) -> CardResult<T>
where
    F: FnOnce() -> CardResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CardError::Internal(format!("Blocking task failed: {}", e)))?
}
