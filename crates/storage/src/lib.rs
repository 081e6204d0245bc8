//! In-memory coordination primitives for the image services.
//!
//! Provides:
//! - A keyed mutex ([`NamedLock`]) with pooled per-key semaphores
//! - A single-flight resource cache ([`ResourceCache`]) for decoded assets
//!   and render intermediates

pub mod named_lock;
pub mod resource_cache;

pub use named_lock::{NamedLock, NamedLockGuard, DEFAULT_POOL_CAPACITY};
pub use resource_cache::{
    CachePolicy, CacheStatsSnapshot, CachedHandle, EvictionListener, EvictionReason,
    ResourceCache, ResourceCacheStats,
};
