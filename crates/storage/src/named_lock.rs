//! Keyed mutual exclusion.
//!
//! [`NamedLock`] hands out one lock per string key. Keys are not known up front
//! (request ids, cache keys, locales), so entries are created on first use and
//! removed again once nobody holds or waits for them.
//!
//! ## Layout
//!
//! - A single map from key to `(semaphore, waiters)` guarded by a std mutex. It is
//!   only held for the map lookup and counter update, never across an await.
//! - Each key gets a one-permit tokio semaphore. Waiting happens on that semaphore,
//!   outside the map mutex, so slow holders of one key never stall other keys.
//! - Semaphores of keys that drained go back to a bounded free-list and are handed
//!   to the next new key. Past the capacity they are simply dropped.
//!
//! Every acquire registers as a waiter before it starts waiting. The registration
//! is owned by the returned guard (or by the pending acquire), so a timeout, a
//! cancellation or dropping the acquire future all give the count back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use card_common::{CardError, CardResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Default number of idle semaphores kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 20;

struct LockEntry {
    semaphore: Arc<Semaphore>,
    waiters: usize,
}

/// Registry of per-key locks.
pub struct NamedLock {
    per_key: Mutex<HashMap<String, LockEntry>>,
    pool: Mutex<Vec<Arc<Semaphore>>>,
    pool_capacity: usize,
}

impl NamedLock {
    /// Create a registry keeping at most `pool_capacity` idle semaphores.
    pub fn new(pool_capacity: usize) -> Self {
        Self::with_initial_fill(pool_capacity, 0)
    }

    /// Create a registry with `initial_fill` semaphores already pooled.
    pub fn with_initial_fill(pool_capacity: usize, initial_fill: usize) -> Self {
        let pool = (0..initial_fill.min(pool_capacity))
            .map(|_| Arc::new(Semaphore::new(1)))
            .collect::<Vec<_>>();

        Self {
            per_key: Mutex::new(HashMap::new()),
            pool: Mutex::new(pool),
            pool_capacity,
        }
    }

    /// Wait until `key` is free and take it.
    ///
    /// `timeout` of `None` waits forever. Fails with [`CardError::LockTimeout`] when
    /// the deadline passes and [`CardError::Cancelled`] when `cancel` fires first.
    pub async fn acquire(
        &self,
        key: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> CardResult<NamedLockGuard<'_>> {
        let (semaphore, mut guard) = self.register(key);

        let wait = async move {
            let permit = match timeout {
                Some(limit) => tokio::time::timeout(limit, semaphore.acquire_owned())
                    .await
                    .map_err(|_| CardError::LockTimeout {
                        key: key.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    })?,
                None => semaphore.acquire_owned().await,
            };
            permit.map_err(|_| CardError::LockState {
                key: key.to_string(),
                message: "semaphore closed".to_string(),
            })
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CardError::Cancelled(key.to_string())),
            result = wait => result,
        };

        match result {
            Ok(permit) => {
                guard.permit = Some(permit);
                Ok(guard)
            }
            Err(e) => {
                debug!(key = key, error = %e, "Named lock not acquired");
                // `guard` drops here and gives the waiter slot back
                Err(e)
            }
        }
    }

    /// Wait for `key` without a deadline or cancellation.
    pub async fn acquire_default(&self, key: &str) -> CardResult<NamedLockGuard<'_>> {
        self.acquire(key, None, &CancellationToken::new()).await
    }

    /// Take `key` only if nobody holds it right now.
    pub fn try_acquire(&self, key: &str) -> Option<NamedLockGuard<'_>> {
        let (semaphore, mut guard) = self.register(key);
        match semaphore.try_acquire_owned() {
            Ok(permit) => {
                guard.permit = Some(permit);
                Some(guard)
            }
            Err(_) => None,
        }
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.lock_map().len()
    }

    /// Holders plus waiters for `key`; zero when the key has no entry.
    pub fn waiters(&self, key: &str) -> usize {
        self.lock_map().get(key).map(|e| e.waiters).unwrap_or(0)
    }

    /// Idle semaphores waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.lock_pool().len()
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool_capacity
    }

    fn register(&self, key: &str) -> (Arc<Semaphore>, NamedLockGuard<'_>) {
        let semaphore = {
            let mut per_key = self.lock_map();
            match per_key.get_mut(key) {
                Some(entry) => {
                    entry.waiters += 1;
                    entry.semaphore.clone()
                }
                None => {
                    let semaphore = self
                        .lock_pool()
                        .pop()
                        .unwrap_or_else(|| Arc::new(Semaphore::new(1)));
                    per_key.insert(
                        key.to_string(),
                        LockEntry {
                            semaphore: semaphore.clone(),
                            waiters: 1,
                        },
                    );
                    semaphore
                }
            }
        };

        let guard = NamedLockGuard {
            lock: self,
            key: key.to_string(),
            permit: None,
            released: false,
        };
        (semaphore, guard)
    }

    /// Give back one waiter slot for `key`, releasing `permit` if it was entered.
    fn release_entry(&self, key: &str, permit: Option<OwnedSemaphorePermit>) -> CardResult<()> {
        let drained = {
            let mut per_key = self.lock_map();
            let entry = per_key.get_mut(key).ok_or_else(|| CardError::LockState {
                key: key.to_string(),
                message: "release of a key that is not held".to_string(),
            })?;

            entry.waiters -= 1;
            if entry.waiters == 0 {
                per_key.remove(key).map(|entry| entry.semaphore)
            } else {
                None
            }
        };

        drop(permit);

        if let Some(semaphore) = drained {
            // Nobody else can reach this semaphore any more, so it must be idle
            if semaphore.available_permits() == 1 {
                let mut pool = self.lock_pool();
                if pool.len() < self.pool_capacity {
                    pool.push(semaphore);
                }
            }
        }

        Ok(())
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        self.per_key.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pool(&self) -> MutexGuard<'_, Vec<Arc<Semaphore>>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NamedLock {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl std::fmt::Debug for NamedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedLock")
            .field("active_keys", &self.active_keys())
            .field("pooled", &self.pooled())
            .field("pool_capacity", &self.pool_capacity)
            .finish()
    }
}

/// Exclusive hold on one key of a [`NamedLock`]. Released on drop.
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct NamedLockGuard<'a> {
    lock: &'a NamedLock,
    key: String,
    permit: Option<OwnedSemaphorePermit>,
    released: bool,
}

impl NamedLockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release explicitly and surface a corrupted lock state instead of logging it.
    pub fn release(mut self) -> CardResult<()> {
        self.released = true;
        self.lock.release_entry(&self.key, self.permit.take())
    }
}

impl Drop for NamedLockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.release_entry(&self.key, self.permit.take()) {
            error!(key = %self.key, error = %e, "Named lock release failed");
            debug_assert!(false, "named lock release failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn test_acquire_and_release_cleans_up() {
        let lock = NamedLock::new(10);

        let guard = lock.acquire_default("a").await.unwrap();
        assert_eq!(guard.key(), "a");
        assert_eq!(lock.active_keys(), 1);
        assert_eq!(lock.waiters("a"), 1);

        drop(guard);
        assert_eq!(lock.active_keys(), 0);
        assert_eq!(lock.waiters("a"), 0);
        assert_eq!(lock.pooled(), 1);
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let lock = NamedLock::new(10);
        let guard = lock.acquire_default("a").await.unwrap();
        guard.release().unwrap();
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_exclusive() {
        let lock = Arc::new(NamedLock::new(10));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lock = lock.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = lock.acquire_default("shared").await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let lock = NamedLock::new(10);
        let _held = lock.acquire_default("slow").await.unwrap();

        let started = Instant::now();
        let other = lock
            .acquire("fast", Some(Duration::from_millis(50)), &CancellationToken::new())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
        drop(other);
        assert_eq!(lock.active_keys(), 1);
    }

    #[tokio::test]
    async fn test_timeout_gives_back_waiter_slot() {
        let lock = NamedLock::new(10);
        let held = lock.acquire_default("a").await.unwrap();

        let started = Instant::now();
        let result = lock
            .acquire("a", Some(Duration::from_millis(50)), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CardError::LockTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(lock.waiters("a"), 1);

        drop(held);
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_gives_back_waiter_slot() {
        let lock = Arc::new(NamedLock::new(10));
        let held = lock.acquire_default("a").await.unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let lock = lock.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { lock.acquire("a", None, &cancel).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lock.waiters("a"), 2);

        cancel.cancel();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CardError::Cancelled(_))));
        assert_eq!(lock.waiters("a"), 1);

        drop(held);
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_dropped_acquire_future_gives_back_waiter_slot() {
        let lock = NamedLock::new(10);
        let held = lock.acquire_default("a").await.unwrap();

        {
            let pending = lock.acquire_default("a");
            tokio::pin!(pending);
            let poll = tokio::time::timeout(Duration::from_millis(10), &mut pending).await;
            assert!(poll.is_err());
            assert_eq!(lock.waiters("a"), 2);
        }

        assert_eq!(lock.waiters("a"), 1);
        drop(held);
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_try_acquire() {
        let lock = NamedLock::new(10);
        let held = lock.try_acquire("a").unwrap();
        assert!(lock.try_acquire("a").is_none());
        assert_eq!(lock.waiters("a"), 1);
        drop(held);
        assert!(lock.try_acquire("a").is_some());
        assert_eq!(lock.active_keys(), 0);
    }

    #[test]
    fn test_release_of_unknown_key_is_an_error() {
        let lock = NamedLock::new(10);
        let result = lock.release_entry("ghost", None);
        assert!(matches!(result, Err(CardError::LockState { .. })));
        assert_eq!(lock.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_pool_is_bounded() {
        let lock = NamedLock::new(2);
        let guards: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|k| lock.try_acquire(k).unwrap())
            .collect();
        assert_eq!(lock.active_keys(), 4);

        drop(guards);
        assert_eq!(lock.active_keys(), 0);
        assert_eq!(lock.pooled(), 2);
    }

    #[tokio::test]
    async fn test_initial_fill_is_reused() {
        let lock = NamedLock::with_initial_fill(5, 1);
        assert_eq!(lock.pooled(), 1);
        let guard = lock.acquire_default("a").await.unwrap();
        assert_eq!(lock.pooled(), 0);
        drop(guard);
        assert_eq!(lock.pooled(), 1);
    }
}
