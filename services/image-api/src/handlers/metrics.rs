//! Health checks, metrics, and monitoring endpoints.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::assets::paths;
use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

// ============================================================================
// Health Checks
// ============================================================================

/// GET /health - Basic health check
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /ready - Readiness check (verifies the fonts can be loaded)
pub async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let cancel = CancellationToken::new();
    for font in [paths::DISPLAY_FONT, paths::PLAIN_FONT] {
        if let Err(e) = state.assets.font(font, &cancel).await {
            warn!(font = font, error = %e, "Not ready");
            return (StatusCode::SERVICE_UNAVAILABLE, "Not ready");
        }
    }
    (StatusCode::OK, "Ready")
}

// ============================================================================
// Prometheus Metrics
// ============================================================================

/// GET /metrics - Prometheus metrics endpoint
#[instrument(skip(state, prometheus))]
pub async fn metrics_handler(
    Extension(state): Extension<Arc<AppState>>,
    prometheus: Option<Extension<PrometheusHandle>>,
) -> Response {
    state.publish_cache_metrics();

    match prometheus {
        Some(Extension(handle)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics recorder not installed").into_response(),
    }
}

/// GET /api/metrics - Application metrics as JSON
pub async fn api_metrics_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot().await)
}
