//! HTTP request handlers.
//!
//! - `shop`, `locker`, `stats`: the card images
//! - `utils`: progress bar, drop location, garbage collection
//! - `metrics`: health checks, Prometheus metrics, and monitoring
//! - `cache`: cache statistics and clearing
//! - `common`: error responses, request cancellation, encoding

pub mod cache;
pub mod common;
pub mod locker;
pub mod metrics;
pub mod shop;
pub mod stats;
pub mod utils;

pub use cache::{cache_clear_handler, cache_stats_handler};
pub use common::{ApiError, ApiResult};
pub use locker::locker_handler;
pub use metrics::{api_metrics_handler, health_handler, metrics_handler, ready_handler};
pub use shop::shop_handler;
pub use stats::{stats_handler, StatsQuery};
pub use utils::{collect_garbage_handler, drop_handler, progress_bar_handler};
