//! POST /locker - grid of the player's items.

use std::sync::Arc;

use axum::{extract::Extension, response::Response, Json};
use card_common::models::Locker;
use card_common::CardError;
use futures::future::try_join_all;
use renderer::locker::{self, LockerCardInputs};
use renderer::{ImageFormat, Pixmap};
use storage::CachedHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::common::{encode, finish, ApiResult, RequestScope};
use crate::assets::paths;
use crate::fetch::FetchRequest;
use crate::metrics::{ImageKind, Stage, Timer};
use crate::run_blocking;
use crate::state::AppState;

#[instrument(skip(state, locker), fields(request_id = %locker.request_id, items = locker.items.len()))]
pub async fn locker_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(locker): Json<Locker>,
) -> ApiResult<Response> {
    state.metrics.record_request(ImageKind::Locker);
    let timer = Timer::start();
    let scope = RequestScope::new();

    let result = render_locker(&state, locker, scope.token()).await;
    finish(&state.metrics, ImageKind::Locker, &timer, result).await
}

/// Per-item bitmaps resolved before drawing, index-aligned with `locker.items`.
#[derive(Default)]
struct ItemBitmaps {
    image: Option<CachedHandle<Pixmap>>,
    rarity_background: Option<CachedHandle<Pixmap>>,
    source_icon: Option<CachedHandle<Pixmap>>,
}

async fn render_locker(
    state: &AppState,
    locker: Locker,
    cancel: &CancellationToken,
) -> ApiResult<(Vec<u8>, ImageFormat)> {
    // Repeated submissions of the same request render one at a time
    let _guard = state
        .locks
        .acquire(
            &format!("locker_{}", locker.request_id),
            state.config.lock_timeout(),
            cancel,
        )
        .await?;

    let font = state.assets.font(paths::DISPLAY_FONT, cancel).await?;

    let timer = Timer::start();
    let mut bitmaps = fetch_item_images(state, &locker, cancel).await?;
    state.metrics.record_stage(Stage::Fetch, timer.elapsed_us()).await;

    let decorations = try_join_all(locker.items.iter().map(|item| async move {
        let rarity_background = state
            .assets
            .asset_fmt(paths::RARITY_BACKGROUND, Some(&item.rarity), cancel)
            .await?;
        let source_icon = state
            .assets
            .asset_fmt(paths::SOURCE_ICON, item.source_type.icon_name(), cancel)
            .await?;
        Ok::<_, CardError>((rarity_background, source_icon))
    }))
    .await?;
    for (slot, (rarity_background, source_icon)) in bitmaps.iter_mut().zip(decorations) {
        slot.rarity_background = rarity_background;
        slot.source_icon = source_icon;
    }

    let timer = Timer::start();
    let image = run_blocking(move || {
        let inputs: Vec<LockerCardInputs<'_>> = bitmaps
            .iter()
            .map(|b| LockerCardInputs {
                image: b.image.as_deref(),
                rarity_background: b.rarity_background.as_deref(),
                source_icon: b.source_icon.as_deref(),
            })
            .collect();
        let cards = locker::generate_item_cards(&locker, &inputs, &font)?;
        locker::generate_locker_image(&locker, &cards, &font)
    })
    .await?;
    state.metrics.record_stage(Stage::Compose, timer.elapsed_us()).await;

    let bytes = encode(&state.metrics, image, ImageFormat::Png).await?;
    Ok((bytes, ImageFormat::Png))
}

/// Download item images for items that have one. Items without an image, or whose
/// download failed, get an empty slot.
async fn fetch_item_images(
    state: &AppState,
    locker: &Locker,
    cancel: &CancellationToken,
) -> Result<Vec<ItemBitmaps>, CardError> {
    let mut bitmaps: Vec<ItemBitmaps> = locker.items.iter().map(|_| ItemBitmaps::default()).collect();

    let (indices, requests): (Vec<usize>, Vec<FetchRequest>) = locker
        .items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            item.image_url
                .as_deref()
                .map(|url| (i, FetchRequest::locker(&item.id, url)))
        })
        .unzip();
    debug!(requested = requests.len(), "Fetching locker item images");

    let fetched = state.images.fetch_all(&requests, cancel).await?;
    for (i, image) in indices.into_iter().zip(fetched) {
        bitmaps[i].image = image;
    }
    Ok(bitmaps)
}
