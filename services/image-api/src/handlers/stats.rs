//! POST /stats - player stats card.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::Response,
    Json,
};
use card_common::models::{Stats, StatsType};
use card_common::CardError;
use futures::future::try_join_all;
use renderer::stats::{self, StatsFonts, StatsImageAssets, StatsTemplateAssets};
use renderer::{ImageFormat, Pixmap};
use serde::Deserialize;
use storage::{CachePolicy, CachedHandle};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::common::{encode, finish, ApiResult, RequestScope};
use crate::assets::paths;
use crate::metrics::{ImageKind, Stage, Timer};
use crate::run_blocking;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(rename = "type", default)]
    pub stats_type: StatsType,
}

#[instrument(skip(state, stats), fields(stats_type = query.stats_type.as_str()))]
pub async fn stats_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
    Json(stats): Json<Stats>,
) -> ApiResult<Response> {
    state.metrics.record_request(ImageKind::Stats);
    let timer = Timer::start();
    let scope = RequestScope::new();

    let result = render_stats(&state, stats, query.stats_type, scope.token()).await;
    finish(&state.metrics, ImageKind::Stats, &timer, result).await
}

/// Cache key of the template for `stats_type` drawn over `background`.
pub fn template_key(stats_type: StatsType, background: Option<&str>) -> String {
    let background_hash = match background {
        Some(path) => {
            let mut hasher = DefaultHasher::new();
            path.hash(&mut hasher);
            format!("_{}", hasher.finish())
        }
        None => String::new(),
    };
    format!("stats_{}{}", stats_type.as_str(), background_hash)
}

async fn render_stats(
    state: &AppState,
    stats: Stats,
    stats_type: StatsType,
    cancel: &CancellationToken,
) -> ApiResult<(Vec<u8>, ImageFormat)> {
    stats
        .validate_for(stats_type)
        .map_err(CardError::InvalidRequest)?;

    let display = state.assets.font(paths::DISPLAY_FONT, cancel).await?;
    let plain = state.assets.font(paths::PLAIN_FONT, cancel).await?;

    let template = stats_template(state, &stats, stats_type, cancel).await?;

    let input_icon = state
        .assets
        .asset_fmt(paths::INPUT_ICON, Some(&stats.input_type), cancel)
        .await?;
    let verified_icon = match stats.is_verified {
        true => state.assets.asset(paths::VERIFIED_ICON, cancel).await?,
        false => None,
    };
    let discord_logo = state.assets.asset(paths::DISCORD_LOGO, cancel).await?;
    let division_icons: Vec<Option<CachedHandle<Pixmap>>> = match &stats.competitive {
        Some(competitive) => {
            try_join_all(competitive.ranked_stats_entries.iter().map(|entry| {
                let name = entry.division_icon_name();
                async move {
                    state
                        .assets
                        .asset_fmt(paths::DIVISION_ICON, Some(&name), cancel)
                        .await
                }
            }))
            .await?
        }
        None => Vec::new(),
    };

    let timer = Timer::start();
    let image = run_blocking(move || {
        let fonts = StatsFonts {
            display: &display,
            plain: &plain,
        };
        let division_icons: Vec<Option<&Pixmap>> =
            division_icons.iter().map(|icon| icon.as_deref()).collect();
        let assets = StatsImageAssets {
            input_icon: input_icon.as_deref(),
            verified_icon: verified_icon.as_deref(),
            discord_logo: discord_logo.as_deref(),
            division_icons: &division_icons,
        };
        stats::generate_image(&stats, stats_type, &template, &fonts, &assets)
    })
    .await?;
    state.metrics.record_stage(Stage::Compose, timer.elapsed_us()).await;

    let bytes = encode(&state.metrics, image, ImageFormat::Png).await?;
    Ok((bytes, ImageFormat::Png))
}

/// Background and empty boxes for `stats_type`, shared by every player with the same
/// background.
async fn stats_template(
    state: &AppState,
    stats: &Stats,
    stats_type: StatsType,
    cancel: &CancellationToken,
) -> ApiResult<CachedHandle<Pixmap>> {
    let key = template_key(stats_type, stats.background_image_path.as_deref());
    let background_path = stats.background_image_path.clone();

    let template = state
        .stats_templates
        .get_or_load(&key, CachePolicy::default(), cancel, || async move {
            let assets = &state.assets;
            let display = assets.font(paths::DISPLAY_FONT, cancel).await?;
            let plain = assets.font(paths::PLAIN_FONT, cancel).await?;
            let background = assets
                .data_fmt(paths::CUSTOM_BACKGROUND, background_path.as_deref(), cancel)
                .await?;
            let [solo_icon, duos_icon, trios_icon, squads_icon, teams_icon] =
                playlist_icons(state, cancel).await?;
            let build_logo = assets.asset(paths::BUILD_LOGO, cancel).await?;
            let zero_build_logo = assets.asset(paths::ZERO_BUILD_LOGO, cancel).await?;

            let timer = Timer::start();
            let bitmap = run_blocking(move || {
                let fonts = StatsFonts {
                    display: &display,
                    plain: &plain,
                };
                let assets = StatsTemplateAssets {
                    background: background.as_deref(),
                    solo_icon: solo_icon.as_deref(),
                    duos_icon: duos_icon.as_deref(),
                    trios_icon: trios_icon.as_deref(),
                    squads_icon: squads_icon.as_deref(),
                    teams_icon: teams_icon.as_deref(),
                    build_logo: build_logo.as_deref(),
                    zero_build_logo: zero_build_logo.as_deref(),
                };
                stats::generate_template(stats_type, &fonts, &assets)
            })
            .await?;
            state.metrics.record_stage(Stage::Template, timer.elapsed_us()).await;
            Ok::<_, CardError>(Some(bitmap))
        })
        .await?;

    template.ok_or_else(|| CardError::Internal(format!("Stats template {} missing", key)).into())
}

async fn playlist_icons(
    state: &AppState,
    cancel: &CancellationToken,
) -> Result<[Option<CachedHandle<Pixmap>>; 5], CardError> {
    let icon = move |name: &'static str| {
        state
            .assets
            .asset_fmt(paths::PLAYLIST_ICON, Some(name), cancel)
    };
    Ok([
        icon("solo").await?,
        icon("duos").await?,
        icon("trios").await?,
        icon("squads").await?,
        icon("teams").await?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_key() {
        assert_eq!(template_key(StatsType::Normal, None), "stats_normal");
        assert_eq!(template_key(StatsType::Competitive, None), "stats_competitive");

        let custom = template_key(StatsType::Normal, Some("bg.png"));
        assert!(custom.starts_with("stats_normal_"));
        assert_eq!(custom, template_key(StatsType::Normal, Some("bg.png")));
        assert_ne!(custom, template_key(StatsType::Normal, Some("other.png")));
    }

    #[test]
    fn test_query_accepts_numeric_type() {
        let query: StatsQuery = parse_query("type=1");
        assert_eq!(query.stats_type, StatsType::Competitive);
        let query: StatsQuery = parse_query("");
        assert_eq!(query.stats_type, StatsType::Normal);
    }

    fn parse_query(query: &str) -> StatsQuery {
        let uri: axum::http::Uri = format!("/stats?{}", query).parse().unwrap();
        Query::<StatsQuery>::try_from_uri(&uri).unwrap().0
    }
}
