//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use renderer::shop::ShopTemplate;
use renderer::{canvas, Pixmap};
use storage::{CachePolicy, CacheStatsSnapshot, NamedLock, ResourceCache};

use crate::assets::SharedAssets;
use crate::config::ServiceConfig;
use crate::fetch::ImageFetcher;
use crate::metrics::MetricsCollector;

/// A shop template and the generation it was built in.
///
/// Every regeneration gets a new generation, and locale templates are keyed by
/// it, so an overlay drawn on a replaced template is never found again.
pub struct VersionedTemplate {
    pub generation: u64,
    pub template: ShopTemplate,
}

/// Shared application state.
///
/// One [`NamedLock`] backs every cache and the handler-level locks, so all
/// coordination keys live in one registry.
pub struct AppState {
    pub config: ServiceConfig,
    pub locks: Arc<NamedLock>,
    pub assets: SharedAssets,
    pub images: ImageFetcher,
    /// Shop card grids keyed by the shop's template hash.
    pub shop_templates: ResourceCache<VersionedTemplate>,
    /// Shop templates with localized text, keyed `{hash}_{generation}_{locale}`.
    pub shop_locale_templates: ResourceCache<Pixmap>,
    /// Stats backgrounds and static boxes, keyed `stats_{type}{background hash}`.
    pub stats_templates: ResourceCache<Pixmap>,
    pub metrics: Arc<MetricsCollector>,
    template_generation: AtomicU64,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let locks = Arc::new(NamedLock::with_initial_fill(
            config.lock_pool_capacity,
            config.lock_pool_initial_fill,
        ));
        let template_bytes = config.template_cache_mb * 1024 * 1024;

        let images = ImageFetcher::new(locks.clone(), &config).context("Failed to set up image fetcher")?;

        let shop_templates = ResourceCache::new("shop_template", locks.clone())
            .with_capacity_bytes(template_bytes, |t: &VersionedTemplate| {
                canvas::byte_size(&t.template.bitmap)
            })
            .with_lock_timeout(config.lock_timeout())
            .with_eviction_listener(|key, _, reason| {
                debug!(key = key, reason = ?reason, "Shop template released");
            });
        let shop_locale_templates = ResourceCache::new("shop_locale_template", locks.clone())
            .with_capacity_bytes(template_bytes, canvas::byte_size)
            .with_lock_timeout(config.lock_timeout());
        let stats_templates = ResourceCache::new("stats_template", locks.clone())
            .with_capacity_bytes(template_bytes, canvas::byte_size)
            .with_lock_timeout(config.lock_timeout());

        info!(
            lock_pool_capacity = config.lock_pool_capacity,
            fetch_parallelism = images.parallelism(),
            image_cache_mb = config.image_cache_mb,
            template_cache_mb = config.template_cache_mb,
            "Application state initialized"
        );

        Ok(Self {
            assets: SharedAssets::new(
                locks.clone(),
                config.assets_dir.clone(),
                config.data_dir.clone(),
            ),
            images,
            shop_templates,
            shop_locale_templates,
            stats_templates,
            metrics: Arc::new(MetricsCollector::new()),
            template_generation: AtomicU64::new(0),
            locks,
            config,
        })
    }

    /// Policy for shop templates: regenerated after the configured TTL.
    pub fn template_policy(&self) -> CachePolicy {
        CachePolicy::ttl(Duration::from_secs(self.config.template_ttl_secs))
    }

    pub fn next_template_generation(&self) -> u64 {
        self.template_generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn cache_stats(&self) -> Vec<CacheStatsSnapshot> {
        let mut stats = self.assets.stats();
        stats.push(self.images.stats());
        stats.push(self.shop_templates.stats());
        stats.push(self.shop_locale_templates.stats());
        stats.push(self.stats_templates.stats());
        stats
    }

    /// Bytes held by caches that may be evicted under memory pressure.
    pub fn evictable_bytes(&self) -> u64 {
        self.images.size_bytes()
            + self.shop_templates.size_bytes()
            + self.shop_locale_templates.size_bytes()
            + self.stats_templates.size_bytes()
    }

    /// Drop item images and templates. Fonts and static bitmaps stay.
    pub async fn clear_evictable(&self) -> usize {
        self.images.clear().await
            + self.shop_templates.clear().await
            + self.shop_locale_templates.clear().await
            + self.stats_templates.clear().await
    }

    /// Drop everything, static assets included.
    pub async fn clear_all(&self) -> usize {
        self.clear_evictable().await + self.assets.clear().await
    }

    pub async fn purge_expired(&self) -> usize {
        self.images.purge_expired().await
            + self.shop_templates.purge_expired().await
            + self.shop_locale_templates.purge_expired().await
            + self.stats_templates.purge_expired().await
    }

    /// Evict `percentage` of every evictable cache, least recently used first.
    pub async fn evict_percentage(&self, percentage: f64) -> usize {
        self.images.evict_percentage(percentage).await
            + self.shop_locale_templates.evict_percentage(percentage).await
            + self.shop_templates.evict_percentage(percentage).await
            + self.stats_templates.evict_percentage(percentage).await
    }

    pub fn publish_cache_metrics(&self) {
        for stats in self.cache_stats() {
            self.metrics.record_cache_stats(&stats);
        }
    }
}
