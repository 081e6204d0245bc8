//! Periodic purge of expired cache entries.
//!
//! TTLs are enforced lazily on read. Entries nobody reads again would otherwise sit
//! in memory until capacity eviction, so this task sweeps them on an interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info};

use crate::state::AppState;

pub struct PurgeTask {
    state: Arc<AppState>,
    interval: Duration,
}

impl PurgeTask {
    pub fn new(state: Arc<AppState>) -> Self {
        let interval = Duration::from_secs(state.config.purge_interval_secs.max(1));
        Self { state, interval }
    }

    /// Purge once and refresh the cache gauges. Returns the number of purged entries.
    pub async fn run_once(&self) -> usize {
        let purged = self.state.purge_expired().await;
        self.state.publish_cache_metrics();
        if purged > 0 {
            metrics::counter!("cache_purged_entries_total").increment(purged as u64);
            info!(purged = purged, "Purged expired cache entries");
        } else {
            debug!("No expired cache entries");
        }
        purged
    }

    pub async fn run_forever(&self) {
        info!(interval_secs = self.interval.as_secs(), "Cache purge task started");
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }
}
