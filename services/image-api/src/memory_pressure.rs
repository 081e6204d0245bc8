//! Memory pressure monitoring and cache eviction.
//!
//! This module monitors process memory usage and evicts item images and templates
//! when usage exceeds the configured threshold.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Memory pressure monitor that runs in the background.
pub struct MemoryPressureMonitor {
    state: Arc<AppState>,
    memory_limit_bytes: u64,
    /// Threshold at which to start evicting (0.0-1.0)
    threshold: f64,
    /// Target memory usage after eviction (0.0-1.0)
    target: f64,
    check_interval: Duration,
}

impl MemoryPressureMonitor {
    pub fn new(state: Arc<AppState>) -> Self {
        let config = &state.config;
        let memory_limit_bytes = if config.memory_limit_mb > 0 {
            config.memory_limit_mb * 1024 * 1024
        } else {
            detect_memory_limit()
        };
        let threshold = config.memory_pressure_threshold;
        let target = config.memory_pressure_target;
        let check_interval = Duration::from_secs(config.memory_check_interval_secs.max(1));

        Self {
            state,
            memory_limit_bytes,
            threshold,
            target,
            check_interval,
        }
    }

    pub async fn run_forever(&self) {
        info!(
            memory_limit_mb = self.memory_limit_bytes / (1024 * 1024),
            threshold_percent = self.threshold * 100.0,
            target_percent = self.target * 100.0,
            check_interval_secs = self.check_interval.as_secs(),
            "Memory pressure monitor started"
        );

        let mut ticker = interval(self.check_interval);
        loop {
            ticker.tick().await;
            self.check_and_evict(get_process_rss()).await;
        }
    }

    /// Evict if `current_rss` is over the threshold. Returns the number of evicted
    /// entries.
    pub async fn check_and_evict(&self, current_rss: u64) -> usize {
        let usage_ratio = current_rss as f64 / self.memory_limit_bytes as f64;

        debug!(
            current_rss_mb = current_rss / (1024 * 1024),
            limit_mb = self.memory_limit_bytes / (1024 * 1024),
            usage_percent = usage_ratio * 100.0,
            "Memory pressure check"
        );
        metrics::gauge!("memory_pressure_usage_ratio").set(usage_ratio);
        metrics::gauge!("memory_pressure_limit_bytes").set(self.memory_limit_bytes as f64);

        if usage_ratio <= self.threshold {
            return 0;
        }

        warn!(
            current_rss_mb = current_rss / (1024 * 1024),
            usage_percent = format!("{:.1}%", usage_ratio * 100.0),
            threshold_percent = format!("{:.1}%", self.threshold * 100.0),
            "Memory pressure threshold exceeded, starting eviction"
        );

        let ratio = self.eviction_ratio(current_rss);
        if ratio <= 0.0 {
            info!("Nothing evictable would relieve memory pressure");
            return 0;
        }

        let evicted = self.state.evict_percentage(ratio).await;
        info!(
            evicted_entries = evicted,
            evict_ratio = format!("{:.0}%", ratio * 100.0),
            "Memory pressure eviction complete"
        );
        metrics::counter!("memory_pressure_evictions").increment(evicted as u64);
        metrics::counter!("memory_pressure_eviction_runs").increment(1);
        evicted
    }

    /// Share of the evictable caches to drop to get from `current_rss` down to the
    /// target, capped at half per run.
    fn eviction_ratio(&self, current_rss: u64) -> f64 {
        let target_bytes = (self.memory_limit_bytes as f64 * self.target) as u64;
        let bytes_to_free = current_rss.saturating_sub(target_bytes);
        let evictable = self.state.evictable_bytes();
        if bytes_to_free == 0 || evictable == 0 {
            return 0.0;
        }
        (bytes_to_free as f64 / evictable as f64).clamp(0.1, 0.5)
    }
}

/// Detect memory limit from cgroup (for containerized environments) or system.
fn detect_memory_limit() -> u64 {
    for path in [
        "/sys/fs/cgroup/memory.max",
        "/sys/fs/cgroup/memory/memory.limit_in_bytes",
    ] {
        if let Ok(limit) = std::fs::read_to_string(path) {
            if let Ok(bytes) = limit.trim().parse::<u64>() {
                if bytes < u64::MAX / 2 {
                    return bytes;
                }
            }
        }
    }

    if let Some(kb) = read_kb_field("/proc/meminfo", "MemTotal:") {
        return kb * 1024;
    }

    // Default to 4GB if we can't detect
    4 * 1024 * 1024 * 1024
}

/// Current process RSS (Resident Set Size) in bytes.
fn get_process_rss() -> u64 {
    read_kb_field("/proc/self/status", "VmRSS:").map_or(0, |kb| kb * 1024)
}

fn read_kb_field(path: &str, field: &str) -> Option<u64> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}
