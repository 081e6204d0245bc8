//! Small utility images and the garbage collection endpoint.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use card_common::models::{DropLocation, ProgressBar};
use card_common::CardError;
use rand::Rng;
use renderer::{drop_map, progress, ImageFormat};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::common::{encode, finish, ApiResult, RequestScope};
use crate::assets::paths;
use crate::metrics::{ImageKind, Stage, Timer};
use crate::run_blocking;
use crate::state::AppState;

const DROP_JPEG_QUALITY: u8 = 100;

// ============================================================================
// Progress bar
// ============================================================================

#[instrument(skip(state, bar), fields(progress = bar.progress))]
pub async fn progress_bar_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(bar): Json<ProgressBar>,
) -> ApiResult<Response> {
    state.metrics.record_request(ImageKind::ProgressBar);
    let timer = Timer::start();
    let scope = RequestScope::new();

    let result = render_progress_bar(&state, bar, scope.token()).await;
    finish(&state.metrics, ImageKind::ProgressBar, &timer, result).await
}

async fn render_progress_bar(
    state: &AppState,
    bar: ProgressBar,
    cancel: &CancellationToken,
) -> ApiResult<(Vec<u8>, ImageFormat)> {
    let font = state.assets.font(paths::PLAIN_FONT, cancel).await?;

    let timer = Timer::start();
    let image = run_blocking(move || progress::generate_progress_bar(&bar, &font)).await?;
    state.metrics.record_stage(Stage::Compose, timer.elapsed_us()).await;

    let bytes = encode(&state.metrics, image, ImageFormat::Png).await?;
    Ok((bytes, ImageFormat::Png))
}

// ============================================================================
// Drop location
// ============================================================================

#[instrument(skip(state, location), fields(locale = %location.locale, x = location.x, y = location.y))]
pub async fn drop_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(location): Json<DropLocation>,
) -> ApiResult<Response> {
    state.metrics.record_request(ImageKind::Drop);
    let timer = Timer::start();
    let scope = RequestScope::new();

    let result = render_drop(&state, location, scope.token()).await;
    finish(&state.metrics, ImageKind::Drop, &timer, result).await
}

async fn render_drop(
    state: &AppState,
    location: DropLocation,
    cancel: &CancellationToken,
) -> ApiResult<(Vec<u8>, ImageFormat)> {
    let map = state
        .assets
        .data_fmt(paths::MAP, Some(&location.locale), cancel)
        .await?
        .ok_or_else(|| CardError::InvalidRequest("Map file doesn't exist.".to_string()))?;

    let marker_count = state.assets.file_count(paths::MAP_MARKERS, "png", cancel).await?;
    let markers_dir = state.assets.assets_dir().join(paths::MAP_MARKERS);
    if marker_count == 0 {
        return Err(CardError::NotFound(format!("No markers in {}", markers_dir.display())).into());
    }
    let index = rand::thread_rng().gen_range(0..marker_count);
    let marker_path = markers_dir.join(format!("{}.png", index));
    let marker = state
        .assets
        .get_bitmap(&marker_path, cancel)
        .await?
        .ok_or_else(|| CardError::NotFound(format!("Marker {}", marker_path.display())))?;

    let timer = Timer::start();
    let image =
        run_blocking(move || drop_map::generate_drop_image(&map, &marker, &location)).await?;
    state.metrics.record_stage(Stage::Compose, timer.elapsed_us()).await;

    let format = ImageFormat::Jpeg {
        quality: DROP_JPEG_QUALITY,
    };
    let bytes = encode(&state.metrics, image, format).await?;
    Ok((bytes, format))
}

// ============================================================================
// Garbage collection
// ============================================================================

/// Release cached item images and templates. Fonts and static bitmaps stay loaded.
pub async fn collect_garbage_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let released = state.clear_evictable().await;
    info!(released = released, "Collected garbage");
    StatusCode::NO_CONTENT.into_response()
}
