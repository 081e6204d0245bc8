//! Cache management handlers.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::state::AppState;

/// GET /api/cache/stats - Per-cache statistics and lock registry state
#[instrument(skip(state))]
pub async fn cache_stats_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let caches = state.cache_stats();
    let total_bytes: u64 = caches.iter().map(|c| c.size_bytes).sum();

    Json(serde_json::json!({
        "caches": caches,
        "total_size_bytes": total_bytes,
        "evictable_size_bytes": state.evictable_bytes(),
        "locks": {
            "active_keys": state.locks.active_keys(),
            "pooled": state.locks.pooled(),
            "pool_capacity": state.locks.pool_capacity(),
        },
    }))
}

/// POST /api/cache/clear - Clear all in-memory caches, static assets included
#[instrument(skip(state))]
pub async fn cache_clear_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let cleared = state.clear_all().await;
    info!(cleared = cleared, "Cleared all caches");

    (StatusCode::OK, format!("Cleared {} cache entries", cleared))
}
