//! Remote item images: download, decode, cache for a while.

use std::sync::Arc;
use std::time::{Duration, Instant};

use card_common::{CardError, CardResult};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use renderer::{canvas, codec, Pixmap};
use reqwest::Client;
use storage::{CachePolicy, CacheStatsSnapshot, CachedHandle, NamedLock, ResourceCache};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::run_blocking;

/// One image to fetch: the cache key it lives under and where to get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub key: String,
    pub url: String,
}

impl FetchRequest {
    pub fn shop(id: &str, url: &str) -> Self {
        Self {
            key: format!("shop_image_{}", id),
            url: url.to_string(),
        }
    }

    pub fn locker(id: &str, url: &str) -> Self {
        Self {
            key: format!("locker_image_{}", id),
            url: url.to_string(),
        }
    }
}

pub struct ImageFetcher {
    client: Client,
    cache: ResourceCache<Pixmap>,
    ttl: Duration,
    parallelism: usize,
}

impl ImageFetcher {
    pub fn new(locks: Arc<NamedLock>, config: &ServiceConfig) -> CardResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| CardError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let cache = ResourceCache::new("image", locks)
            .with_capacity_bytes(config.image_cache_mb * 1024 * 1024, canvas::byte_size)
            .with_lock_timeout(config.lock_timeout())
            .with_eviction_listener(|key, _, reason| {
                debug!(key = key, reason = ?reason, "Item image released");
                counter!("image_cache_releases_total").increment(1);
            });

        Ok(Self {
            client,
            cache,
            ttl: Duration::from_secs(config.image_ttl_secs),
            parallelism: config.fetch_parallelism(),
        })
    }

    /// Cached image for `request`, downloading it if needed.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> CardResult<CachedHandle<Pixmap>> {
        let image = self
            .cache
            .get_or_load(&request.key, CachePolicy::ttl(self.ttl), cancel, || async {
                let started = Instant::now();
                let bytes = self.download(&request.url).await?;
                histogram!("image_fetch_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);
                counter!("image_fetch_bytes_total").increment(bytes.len() as u64);

                let image = run_blocking(move || codec::decode(&bytes)).await?;
                Ok(Some(image))
            })
            .await?;
        image.ok_or_else(|| CardError::NotFound(request.url.clone()))
    }

    /// Fetch all `requests` with bounded concurrency. The result is index-aligned with
    /// `requests`.
    ///
    /// A failed image is logged and comes back as `None` so the card is still drawn.
    /// Cancellation aborts the whole batch.
    pub async fn fetch_all(
        &self,
        requests: &[FetchRequest],
        cancel: &CancellationToken,
    ) -> CardResult<Vec<Option<CachedHandle<Pixmap>>>> {
        let mut results: Vec<Option<CachedHandle<Pixmap>>> = vec![None; requests.len()];

        let pending: Vec<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| async move { (index, self.fetch(request, cancel).await) })
            .collect();
        let mut fetches = stream::iter(pending).buffer_unordered(self.parallelism);

        while let Some((index, result)) = fetches.next().await {
            match result {
                Ok(image) => results[index] = Some(image),
                Err(e @ CardError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    counter!("image_fetch_errors_total").increment(1);
                    warn!(
                        key = %requests[index].key,
                        url = %requests[index].url,
                        error = %e,
                        "Item image unavailable"
                    );
                }
            }
        }
        Ok(results)
    }

    async fn download(&self, url: &str) -> CardResult<Vec<u8>> {
        let failed = |e: reqwest::Error| CardError::FetchFailed {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(failed)?
            .error_for_status()
            .map_err(failed)?;
        let bytes = response.bytes().await.map_err(failed)?;
        Ok(bytes.to_vec())
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }

    pub async fn evict_percentage(&self, percentage: f64) -> usize {
        self.cache.evict_percentage(percentage).await
    }

    pub async fn clear(&self) -> usize {
        self.cache.clear().await
    }

    pub fn size_bytes(&self) -> u64 {
        self.cache.size_bytes()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}
