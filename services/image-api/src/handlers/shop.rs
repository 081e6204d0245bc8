//! POST /shop - item shop image.
//!
//! Three stages, each cached separately:
//! 1. Template: card grid without text, keyed by the layout hash.
//! 2. Locale template: the template with titles, names and prices, keyed by hash,
//!    template generation and locale.
//! 3. Final image: background, locale template and creator code box, drawn fresh for
//!    every request.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::Extension, response::Response, Json};
use card_common::models::Shop;
use card_common::CardError;
use renderer::shop::{self, ShopAssets};
use renderer::{Font, ImageFormat, Pixmap};
use storage::CachedHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::common::{encode, finish, ApiResult, RequestScope};
use crate::assets::paths;
use crate::fetch::FetchRequest;
use crate::metrics::{ImageKind, Stage, Timer};
use crate::run_blocking;
use crate::state::{AppState, VersionedTemplate};

#[instrument(skip(state, shop), fields(locale = %shop.locale, sections = shop.sections.len()))]
pub async fn shop_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(shop): Json<Shop>,
) -> ApiResult<Response> {
    state.metrics.record_request(ImageKind::Shop);
    let timer = Timer::start();
    let scope = RequestScope::new();

    let result = render_shop(&state, shop, scope.token()).await;
    finish(&state.metrics, ImageKind::Shop, &timer, result).await
}

async fn render_shop(
    state: &AppState,
    shop: Shop,
    cancel: &CancellationToken,
) -> ApiResult<(Vec<u8>, ImageFormat)> {
    shop.validate().map_err(CardError::InvalidRequest)?;
    let shop = Arc::new(shop);
    let font = state.assets.font(paths::DISPLAY_FONT, cancel).await?;

    let template = shop_template(state, &shop, &font, cancel).await?;
    let locale_template = locale_template(state, &shop, template, &font, cancel).await?;

    let background = state
        .assets
        .data_fmt(paths::CUSTOM_BACKGROUND, shop.background_image_path.as_deref(), cancel)
        .await?;
    let ad_banner = match shop.creator_code {
        Some(_) => state.assets.asset(paths::AD_BANNER, cancel).await?,
        None => None,
    };

    let timer = Timer::start();
    let image = run_blocking(move || {
        shop::generate_shop_image(
            &shop,
            &locale_template,
            &font,
            background.as_deref(),
            ad_banner.as_deref(),
        )
    })
    .await?;
    state.metrics.record_stage(Stage::Compose, timer.elapsed_us()).await;

    let bytes = encode(&state.metrics, image, ImageFormat::Png).await?;
    Ok((bytes, ImageFormat::Png))
}

/// Cached template for the shop's layout. `newShop` regenerates it under a new
/// generation and drops the locale templates of older ones.
async fn shop_template(
    state: &AppState,
    shop: &Arc<Shop>,
    font: &CachedHandle<Font<'static>>,
    cancel: &CancellationToken,
) -> ApiResult<CachedHandle<VersionedTemplate>> {
    let hash = shop.template_hash();
    let key = hash.to_string();
    let loader = || generate_template(state, shop.clone(), font.clone(), cancel);

    let template = if shop.is_new_shop() {
        info!(template = %key, "New shop, regenerating templates");
        let template = state
            .shop_templates
            .refresh(&key, state.template_policy(), cancel, loader)
            .await?;
        let dropped = state
            .shop_locale_templates
            .invalidate_prefix(&format!("{}_", hash))
            .await;
        debug!(template = %key, dropped = dropped, "Dropped stale locale templates");
        template
    } else {
        state
            .shop_templates
            .get_or_load(&key, state.template_policy(), cancel, loader)
            .await?
    };

    template.ok_or_else(|| CardError::Internal(format!("Shop template {} missing", key)).into())
}

fn locale_template_key(shop: &Shop, template: &VersionedTemplate) -> String {
    format!("{}_{}_{}", shop.template_hash(), template.generation, shop.locale)
}

async fn generate_template(
    state: &AppState,
    shop: Arc<Shop>,
    font: CachedHandle<Font<'static>>,
    cancel: &CancellationToken,
) -> Result<Option<VersionedTemplate>, CardError> {
    let timer = Timer::start();
    let requests: Vec<FetchRequest> = shop
        .entries()
        .map(|entry| FetchRequest::shop(&entry.id, entry.image_source()))
        .collect();
    let fetched = state.images.fetch_all(&requests, cancel).await?;
    state.metrics.record_stage(Stage::Fetch, timer.elapsed_us()).await;

    let images: HashMap<String, CachedHandle<Pixmap>> = shop
        .entries()
        .zip(fetched)
        .filter_map(|(entry, image)| image.map(|image| (entry.id.clone(), image)))
        .collect();
    let vbucks_icon = state.assets.asset(paths::VBUCKS_ICON, cancel).await?;

    let timer = Timer::start();
    let template = run_blocking(move || {
        let assets = ShopAssets {
            font: &font,
            vbucks_icon: vbucks_icon.as_deref(),
        };
        shop::generate_template(&shop, &images, &assets)
    })
    .await?;
    state.metrics.record_stage(Stage::Template, timer.elapsed_us()).await;
    Ok(Some(VersionedTemplate {
        generation: state.next_template_generation(),
        template,
    }))
}

async fn locale_template(
    state: &AppState,
    shop: &Arc<Shop>,
    template: CachedHandle<VersionedTemplate>,
    font: &CachedHandle<Font<'static>>,
    cancel: &CancellationToken,
) -> ApiResult<CachedHandle<Pixmap>> {
    let key = locale_template_key(shop, &template);
    let shop = shop.clone();
    let font = font.clone();

    let locale_template = state
        .shop_locale_templates
        .get_or_load(&key, state.template_policy(), cancel, || async move {
            let timer = Timer::start();
            let bitmap = run_blocking(move || {
                shop::generate_locale_template(&shop, &template.template, &font)
            })
            .await?;
            state
                .metrics
                .record_stage(Stage::LocaleTemplate, timer.elapsed_us())
                .await;
            Ok::<_, CardError>(Some(bitmap))
        })
        .await?;

    locale_template
        .ok_or_else(|| CardError::Internal(format!("Locale template {} missing", key)).into())
}
