//! Single-flight in-memory cache for decoded assets and render intermediates.
//!
//! Values are loaded at most once per key: concurrent callers for the same key
//! serialize on a [`NamedLock`] and all but the first find the value already
//! present when they get the lock.
//!
//! ## Lifetime
//!
//! Every present entry owns an `Arc`'d slot and readers get a [`CachedHandle`]
//! cloned from it. Removing an entry (expiry, invalidation, replacement, capacity,
//! clear) only drops the cache's reference. The eviction listener runs from the
//! slot's `Drop`, i.e. once, after the last handle is gone, outside the cache lock.
//!
//! ## Eviction
//!
//! - TTL is enforced lazily on read and by [`ResourceCache::purge_expired`].
//! - When a weigher and `max_bytes` are configured, inserting past the limit evicts
//!   ~5% of capacity in LRU order. Pinned entries (see [`CachePolicy::never_evict`])
//!   are skipped by capacity eviction but still go on `invalidate` and `clear`.
//! - Permanently-absent keys can be cached as not-found entries.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use card_common::{CardError, CardResult};
use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::named_lock::NamedLock;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    Expired,
    Invalidated,
    Replaced,
    Capacity,
    Cleared,
}

pub type EvictionListener<T> = Arc<dyn Fn(&str, &T, EvictionReason) + Send + Sync>;
pub type Weigher<T> = Arc<dyn Fn(&T) -> u64 + Send + Sync>;

/// How long an inserted entry may stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CachePolicy {
    /// Expire after this long; `None` keeps the entry until removed.
    pub ttl: Option<Duration>,
    /// Store `Ok(None)` loader results as a not-found entry.
    pub cache_not_found: bool,
    /// Exempt from capacity eviction and `evict_percentage`.
    pub pinned: bool,
}

impl CachePolicy {
    /// Static assets: kept until invalidated or cleared.
    pub fn never_evict() -> Self {
        Self {
            ttl: None,
            cache_not_found: true,
            pinned: true,
        }
    }

    /// Expire `ttl` after insertion.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            cache_not_found: false,
            pinned: false,
        }
    }

    pub fn cache_not_found(mut self, cache_not_found: bool) -> Self {
        self.cache_not_found = cache_not_found;
        self
    }
}

struct Slot<T> {
    key: String,
    value: T,
    reason: OnceLock<EvictionReason>,
    listener: Option<EvictionListener<T>>,
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if let Some(listener) = &self.listener {
            let reason = self.reason.get().copied().unwrap_or(EvictionReason::Cleared);
            listener(&self.key, &self.value, reason);
        }
    }
}

/// Shared read access to a cached value. Keeps the value alive after eviction.
pub struct CachedHandle<T>(Arc<Slot<T>>);

impl<T> CachedHandle<T> {
    pub fn key(&self) -> &str {
        &self.0.key
    }
}

impl<T> Clone for CachedHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for CachedHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0.value
    }
}

impl<T> AsRef<T> for CachedHandle<T> {
    fn as_ref(&self) -> &T {
        &self.0.value
    }
}

impl<T: fmt::Debug> fmt::Debug for CachedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CachedHandle").field(&self.0.value).finish()
    }
}

struct CacheEntry<T> {
    /// `None` is a cached not-found.
    slot: Option<Arc<Slot<T>>>,
    inserted_at: Instant,
    ttl: Option<Duration>,
    pinned: bool,
    weight: u64,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.inserted_at.elapsed() > ttl)
    }

    fn retire(self, reason: EvictionReason) -> Self {
        if let Some(slot) = &self.slot {
            let _ = slot.reason.set(reason);
        }
        self
    }

    fn handle(&self) -> Option<CachedHandle<T>> {
        self.slot.clone().map(CachedHandle)
    }
}

/// Counters for one cache. All fields are atomic for lock-free reads.
#[derive(Default)]
pub struct ResourceCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Loader runs that completed successfully
    pub loads: AtomicU64,
    pub load_failures: AtomicU64,
    pub evictions: AtomicU64,
    pub expired: AtomicU64,
    pub eviction_runs: AtomicU64,
    pub size_bytes: AtomicU64,
    pub entry_count: AtomicU64,
    pub not_found_entries: AtomicU64,
}

impl ResourceCacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

/// Point-in-time copy of [`ResourceCacheStats`] for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
    pub expired: u64,
    pub eviction_runs: u64,
    pub entries: u64,
    pub not_found_entries: u64,
    pub size_bytes: u64,
    pub max_bytes: u64,
}

enum Lookup<T> {
    Present(Option<CachedHandle<T>>),
    Missing,
}

/// Memoizing, single-flight cache keyed by string.
pub struct ResourceCache<T> {
    name: String,
    entries: Mutex<LruCache<String, CacheEntry<T>>>,
    locks: Arc<NamedLock>,
    lock_timeout: Option<Duration>,
    max_bytes: u64,
    weigher: Option<Weigher<T>>,
    listener: Option<EvictionListener<T>>,
    stats: ResourceCacheStats,
}

impl<T: Send + Sync + 'static> ResourceCache<T> {
    /// Unbounded cache named `name`, gating loads through `locks`.
    ///
    /// The name namespaces lock keys so caches sharing one [`NamedLock`] never
    /// contend on equal keys.
    pub fn new(name: impl Into<String>, locks: Arc<NamedLock>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(LruCache::unbounded()),
            locks,
            lock_timeout: None,
            max_bytes: 0,
            weigher: None,
            listener: None,
            stats: ResourceCacheStats::default(),
        }
    }

    /// Bound the cache to `max_bytes` as measured by `weigher`.
    pub fn with_capacity_bytes(
        mut self,
        max_bytes: u64,
        weigher: impl Fn(&T) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.max_bytes = max_bytes;
        self.weigher = Some(Arc::new(weigher));
        self
    }

    /// Called once per value after it left the cache and its last handle dropped.
    pub fn with_eviction_listener(
        mut self,
        listener: impl Fn(&str, &T, EvictionReason) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Give up on a load gate after `timeout` with [`CardError::LockTimeout`].
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the cached value for `key` or load it exactly once.
    ///
    /// `Ok(None)` means the key is absent: either `loader` said so or a cached
    /// not-found entry did. Loader errors are returned and nothing is stored. A
    /// load interrupted by `cancel` is never stored.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        cancel: &CancellationToken,
        loader: F,
    ) -> CardResult<Option<CachedHandle<T>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CardResult<Option<T>>>,
    {
        if let Lookup::Present(found) = self.lookup(key, true).await {
            return Ok(found);
        }

        let _guard = self
            .locks
            .acquire(&self.lock_key(key), self.lock_timeout, cancel)
            .await?;

        // Someone else may have populated it while we waited
        if let Lookup::Present(found) = self.lookup(key, false).await {
            // Served from cache after all, so the miss recorded above becomes a hit
            self.stats.misses.fetch_sub(1, Ordering::Relaxed);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        let loaded = self.run_loader(key, cancel, loader).await?;
        Ok(self.store(key, loaded, policy).await)
    }

    /// Reload `key` unconditionally and replace whatever is cached.
    ///
    /// Goes through the same gate as [`get_or_load`](Self::get_or_load), so a
    /// refresh never races a concurrent load of the same key.
    pub async fn refresh<F, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        cancel: &CancellationToken,
        loader: F,
    ) -> CardResult<Option<CachedHandle<T>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CardResult<Option<T>>>,
    {
        let _guard = self
            .locks
            .acquire(&self.lock_key(key), self.lock_timeout, cancel)
            .await?;

        let loaded = self.run_loader(key, cancel, loader).await?;
        if loaded.is_none() && !policy.cache_not_found {
            self.invalidate(key).await;
            return Ok(None);
        }
        Ok(self.store(key, loaded, policy).await)
    }

    /// Look up a present value without loading. Not-found entries read as `None`.
    pub async fn get(&self, key: &str) -> Option<CachedHandle<T>> {
        match self.lookup(key, true).await {
            Lookup::Present(found) => found,
            Lookup::Missing => None,
        }
    }

    /// Whether `key` has a live entry, including a not-found entry.
    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        entries.peek(key).is_some_and(|e| !e.is_expired())
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock().await;
            let removed = entries.pop(key);
            if let Some(entry) = &removed {
                self.account_removal(entry);
            }
            removed
        };
        match removed {
            Some(entry) => {
                drop(entry.retire(EvictionReason::Invalidated));
                true
            }
            None => false,
        }
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many went.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let retired = {
            let mut entries = self.entries.lock().await;
            let keys: Vec<String> = entries
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter()
                .filter_map(|k| entries.pop(k))
                .map(|e| {
                    self.account_removal(&e);
                    e.retire(EvictionReason::Invalidated)
                })
                .collect::<Vec<_>>()
        };
        retired.len()
    }

    /// Remove expired entries now instead of on their next read.
    pub async fn purge_expired(&self) -> usize {
        let retired = {
            let mut entries = self.entries.lock().await;
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.is_expired())
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter()
                .filter_map(|k| entries.pop(k))
                .map(|e| {
                    self.account_removal(&e);
                    e.retire(EvictionReason::Expired)
                })
                .collect::<Vec<_>>()
        };
        self.stats
            .expired
            .fetch_add(retired.len() as u64, Ordering::Relaxed);
        if !retired.is_empty() {
            debug!(cache = %self.name, purged = retired.len(), "Purged expired entries");
        }
        retired.len()
    }

    /// Remove every entry, pinned ones included. Hit, miss and load counters
    /// are kept.
    pub async fn clear(&self) -> usize {
        let retired = {
            let mut entries = self.entries.lock().await;
            let mut retired = Vec::with_capacity(entries.len());
            while let Some((_, entry)) = entries.pop_lru() {
                self.account_removal(&entry);
                retired.push(entry.retire(EvictionReason::Cleared));
            }
            retired
        };
        retired.len()
    }

    /// Evict a fraction (0.0 to 1.0) of the evictable entries in LRU order.
    ///
    /// Used by the memory pressure monitor.
    pub async fn evict_percentage(&self, percentage: f64) -> usize {
        let retired = {
            let mut entries = self.entries.lock().await;
            let evictable = entries.iter().filter(|(_, e)| !e.pinned).count();
            let to_evict = (evictable as f64 * percentage.clamp(0.0, 1.0)) as usize;

            let keys: Vec<String> = entries
                .iter()
                .rev()
                .filter(|(_, e)| !e.pinned)
                .take(to_evict)
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter()
                .filter_map(|k| entries.pop(k))
                .map(|e| {
                    self.account_removal(&e);
                    e.retire(EvictionReason::Capacity)
                })
                .collect::<Vec<_>>()
        };

        let bytes_freed: u64 = retired.iter().map(|e| e.weight).sum();
        self.stats
            .evictions
            .fetch_add(retired.len() as u64, Ordering::Relaxed);
        self.stats.eviction_runs.fetch_add(1, Ordering::Relaxed);

        info!(
            cache = %self.name,
            evicted_entries = retired.len(),
            bytes_freed_mb = format!("{:.2}", bytes_freed as f64 / (1024.0 * 1024.0)),
            trigger = "memory_pressure",
            "Cache eviction completed"
        );

        retired.len()
    }

    pub fn len(&self) -> usize {
        self.stats.entry_count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.stats.size_bytes.load(Ordering::Relaxed)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Size as a fraction of `max_bytes`; 0.0 for unbounded caches.
    pub fn utilization(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            self.size_bytes() as f64 / self.max_bytes as f64
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let s = &self.stats;
        CacheStatsSnapshot {
            name: self.name.clone(),
            hits: s.hits.load(Ordering::Relaxed),
            misses: s.misses.load(Ordering::Relaxed),
            hit_rate: s.hit_rate(),
            loads: s.loads.load(Ordering::Relaxed),
            load_failures: s.load_failures.load(Ordering::Relaxed),
            evictions: s.evictions.load(Ordering::Relaxed),
            expired: s.expired.load(Ordering::Relaxed),
            eviction_runs: s.eviction_runs.load(Ordering::Relaxed),
            entries: s.entry_count.load(Ordering::Relaxed),
            not_found_entries: s.not_found_entries.load(Ordering::Relaxed),
            size_bytes: s.size_bytes.load(Ordering::Relaxed),
            max_bytes: self.max_bytes,
        }
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}:{}", self.name, key)
    }

    async fn lookup(&self, key: &str, record: bool) -> Lookup<T> {
        let expired = {
            let mut entries = self.entries.lock().await;
            match entries.get(key).map(|e| (e.is_expired(), e.handle())) {
                Some((false, handle)) => {
                    if record {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    }
                    return Lookup::Present(handle);
                }
                Some((true, _)) => {
                    let expired = entries.pop(key);
                    if let Some(entry) = &expired {
                        self.account_removal(entry);
                    }
                    expired
                }
                None => None,
            }
        };

        if let Some(entry) = expired {
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
            drop(entry.retire(EvictionReason::Expired));
        }
        if record {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        Lookup::Missing
    }

    async fn run_loader<F, Fut>(
        &self,
        key: &str,
        cancel: &CancellationToken,
        loader: F,
    ) -> CardResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CardResult<Option<T>>>,
    {
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CardError::Cancelled(self.lock_key(key))),
            result = loader() => result,
        };

        match &result {
            Ok(_) => {
                self.stats.loads.fetch_add(1, Ordering::Relaxed);
                debug!(
                    cache = %self.name,
                    key = key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Loaded cache entry"
                );
            }
            Err(e) => {
                self.stats.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(cache = %self.name, key = key, error = %e, "Cache load failed");
            }
        }
        result
    }

    /// Insert a loaded value. Returns the handle to hand back to the caller.
    async fn store(
        &self,
        key: &str,
        value: Option<T>,
        policy: CachePolicy,
    ) -> Option<CachedHandle<T>> {
        if value.is_none() && !policy.cache_not_found {
            return None;
        }

        let weight = match (&value, &self.weigher) {
            (Some(v), Some(weigher)) => weigher(v),
            _ => 0,
        };
        let entry = CacheEntry {
            slot: value.map(|value| {
                Arc::new(Slot {
                    key: key.to_string(),
                    value,
                    reason: OnceLock::new(),
                    listener: self.listener.clone(),
                })
            }),
            inserted_at: Instant::now(),
            ttl: policy.ttl,
            pinned: policy.pinned,
            weight,
        };
        let handle = entry.handle();
        let not_found = entry.slot.is_none();

        let mut retired = Vec::new();
        {
            let mut entries = self.entries.lock().await;

            if let Some(previous) = entries.pop(key) {
                self.account_removal(&previous);
                retired.push(previous.retire(EvictionReason::Replaced));
            }

            if self.max_bytes > 0 && self.size_bytes().saturating_add(weight) > self.max_bytes {
                retired.extend(self.evict_batch_locked(&mut entries));
            }

            entries.put(key.to_string(), entry);
            self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
            self.stats.size_bytes.fetch_add(weight, Ordering::Relaxed);
            if not_found {
                self.stats.not_found_entries.fetch_add(1, Ordering::Relaxed);
            }
        }

        // Listeners of replaced or evicted values run here, outside the lock
        drop(retired);
        handle
    }

    /// Evict ~5% of capacity (by weight) in LRU order, skipping pinned entries.
    fn evict_batch_locked(
        &self,
        entries: &mut LruCache<String, CacheEntry<T>>,
    ) -> Vec<CacheEntry<T>> {
        let target_free = (self.max_bytes / 20).max(1);
        let mut bytes_freed = 0u64;

        let keys: Vec<String> = entries
            .iter()
            .rev()
            .filter(|(_, e)| !e.pinned)
            .take_while(|(_, e)| {
                let take = bytes_freed < target_free;
                bytes_freed += e.weight;
                take
            })
            .map(|(k, _)| k.clone())
            .collect();

        let retired: Vec<_> = keys
            .iter()
            .filter_map(|k| entries.pop(k))
            .map(|e| {
                self.account_removal(&e);
                e.retire(EvictionReason::Capacity)
            })
            .collect();

        let freed: u64 = retired.iter().map(|e| e.weight).sum();
        self.stats
            .evictions
            .fetch_add(retired.len() as u64, Ordering::Relaxed);
        self.stats.eviction_runs.fetch_add(1, Ordering::Relaxed);

        info!(
            cache = %self.name,
            entries_evicted = retired.len(),
            bytes_freed_mb = format!("{:.2}", freed as f64 / (1024.0 * 1024.0)),
            cache_size_mb = format!("{:.2}", self.size_bytes() as f64 / (1024.0 * 1024.0)),
            max_size_mb = format!("{:.2}", self.max_bytes as f64 / (1024.0 * 1024.0)),
            "Cache batch eviction completed"
        );

        retired
    }

    /// Caller holds the entries lock, like every other size or count update.
    fn account_removal(&self, entry: &CacheEntry<T>) {
        self.stats.entry_count.fetch_sub(1, Ordering::Relaxed);
        self.stats
            .size_bytes
            .fetch_sub(entry.weight, Ordering::Relaxed);
        if entry.slot.is_none() {
            self.stats.not_found_entries.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl<T> fmt::Debug for ResourceCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("name", &self.name)
            .field("entries", &self.stats.entry_count.load(Ordering::Relaxed))
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
