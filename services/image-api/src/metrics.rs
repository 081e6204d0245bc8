//! Application metrics collection and reporting.

use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use storage::CacheStatsSnapshot;
use tokio::sync::RwLock;

/// Image endpoints, used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Shop,
    Locker,
    Stats,
    ProgressBar,
    Drop,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Shop => "shop",
            ImageKind::Locker => "locker",
            ImageKind::Stats => "stats",
            ImageKind::ProgressBar => "progress_bar",
            ImageKind::Drop => "drop",
        }
    }
}

/// Render pipeline stages with their own timing stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Template,
    LocaleTemplate,
    Compose,
    Encode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Template => "template",
            Stage::LocaleTemplate => "locale_template",
            Stage::Compose => "compose",
            Stage::Encode => "encode",
        }
    }
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    last_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;
        if self.min_us == 0 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    fn summary(&self) -> TimingSummary {
        TimingSummary {
            count: self.count,
            avg_ms: if self.count == 0 {
                0.0
            } else {
                (self.total_us as f64 / self.count as f64) / 1000.0
            },
            min_ms: self.min_us as f64 / 1000.0,
            max_ms: self.max_us as f64 / 1000.0,
            last_ms: self.last_us as f64 / 1000.0,
        }
    }
}

/// Metrics collector for the image API.
#[derive(Debug)]
pub struct MetricsCollector {
    pub requests: AtomicU64,
    pub renders_total: AtomicU64,
    pub render_errors: AtomicU64,
    pub bytes_out: AtomicU64,

    kind_times: RwLock<HashMap<ImageKind, TimingStats>>,
    stage_times: RwLock<HashMap<Stage, TimingStats>>,

    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            renders_total: AtomicU64::new(0),
            render_errors: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            kind_times: RwLock::new(HashMap::new()),
            stage_times: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self, kind: ImageKind) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!("image_requests_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record a finished image request end to end.
    pub async fn record_render(&self, kind: ImageKind, duration_us: u64, bytes: Option<usize>) {
        self.renders_total.fetch_add(1, Ordering::Relaxed);
        counter!("renders_total", "kind" => kind.as_str()).increment(1);

        match bytes {
            Some(bytes) => {
                self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
                histogram!("render_duration_ms", "kind" => kind.as_str())
                    .record(duration_us as f64 / 1000.0);
                histogram!("image_size_bytes", "kind" => kind.as_str()).record(bytes as f64);
                self.kind_times
                    .write()
                    .await
                    .entry(kind)
                    .or_default()
                    .record(duration_us);
            }
            None => {
                self.render_errors.fetch_add(1, Ordering::Relaxed);
                counter!("render_errors_total", "kind" => kind.as_str()).increment(1);
            }
        }
    }

    pub async fn record_stage(&self, stage: Stage, duration_us: u64) {
        histogram!("render_stage_duration_ms", "stage" => stage.as_str())
            .record(duration_us as f64 / 1000.0);
        self.stage_times
            .write()
            .await
            .entry(stage)
            .or_default()
            .record(duration_us);
    }

    /// Publish a cache's counters as gauges labelled with its name.
    pub fn record_cache_stats(&self, stats: &CacheStatsSnapshot) {
        let cache = stats.name.clone();
        gauge!("cache_hits_total", "cache" => cache.clone()).set(stats.hits as f64);
        gauge!("cache_misses_total", "cache" => cache.clone()).set(stats.misses as f64);
        gauge!("cache_hit_rate_percent", "cache" => cache.clone()).set(stats.hit_rate);
        gauge!("cache_entries", "cache" => cache.clone()).set(stats.entries as f64);
        gauge!("cache_size_bytes", "cache" => cache.clone()).set(stats.size_bytes as f64);
        gauge!("cache_evictions_total", "cache" => cache).set(stats.evictions as f64);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let kind_times = self.kind_times.read().await;
        let stage_times = self.stage_times.read().await;

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            renders_total: self.renders_total.load(Ordering::Relaxed),
            render_errors: self.render_errors.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            by_kind: kind_times.iter().map(|(k, t)| (*k, t.summary())).collect(),
            by_stage: stage_times.iter().map(|(s, t)| (*s, t.summary())).collect(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics for JSON serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub renders_total: u64,
    pub render_errors: u64,
    pub bytes_out: u64,
    pub by_kind: HashMap<ImageKind, TimingSummary>,
    pub by_stage: HashMap<Stage, TimingSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSummary {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
}

/// Timer guard for measuring operation duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_render_and_stage_stats() {
        let metrics = MetricsCollector::new();
        metrics.record_request(ImageKind::Shop);
        metrics.record_render(ImageKind::Shop, 2_000, Some(100)).await;
        metrics.record_render(ImageKind::Shop, 4_000, Some(300)).await;
        metrics.record_render(ImageKind::Locker, 1_000, None).await;
        metrics.record_stage(Stage::Encode, 500).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.renders_total, 3);
        assert_eq!(snapshot.render_errors, 1);
        assert_eq!(snapshot.bytes_out, 400);

        let shop = &snapshot.by_kind[&ImageKind::Shop];
        assert_eq!(shop.count, 2);
        assert!((shop.avg_ms - 3.0).abs() < 1e-9);
        assert!((shop.min_ms - 2.0).abs() < 1e-9);
        assert!((shop.max_ms - 4.0).abs() < 1e-9);
        assert!(!snapshot.by_kind.contains_key(&ImageKind::Locker));
        assert_eq!(snapshot.by_stage[&Stage::Encode].count, 1);
    }

    #[test]
    fn test_snapshot_serializes_enum_keys() {
        let snapshot = MetricsSnapshot {
            uptime_secs: 1,
            requests: 0,
            renders_total: 0,
            render_errors: 0,
            bytes_out: 0,
            by_kind: HashMap::from([(ImageKind::ProgressBar, TimingStats::default().summary())]),
            by_stage: HashMap::new(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["by_kind"]["progress_bar"].is_object());
    }
}
