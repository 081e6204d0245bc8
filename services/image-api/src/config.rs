//! Service configuration.
//!
//! Values come from an optional YAML file, then environment variables override the
//! common knobs. Everything has a default so the service starts with no file at all.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root of the bundled assets (fonts, icons, backgrounds).
    pub assets_dir: PathBuf,
    /// Root of deployment data (custom backgrounds, island maps).
    pub data_dir: PathBuf,

    /// Idle per-key semaphores kept for reuse.
    pub lock_pool_capacity: usize,
    /// Semaphores created up front.
    pub lock_pool_initial_fill: usize,
    /// Give up waiting for a named lock after this long. 0 waits forever.
    pub lock_timeout_secs: u64,

    pub fetch_timeout_secs: u64,
    /// Concurrent item image downloads per request. 0 means half the CPU count.
    pub fetch_parallelism: usize,

    pub image_ttl_secs: u64,
    pub template_ttl_secs: u64,
    pub image_cache_mb: u64,
    pub template_cache_mb: u64,

    pub request_timeout_secs: u64,
    pub purge_interval_secs: u64,

    /// Memory limit for the pressure monitor. 0 detects it from cgroup or /proc.
    pub memory_limit_mb: u64,
    pub memory_pressure_threshold: f64,
    pub memory_pressure_target: f64,
    pub memory_check_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("Assets"),
            data_dir: PathBuf::from("data"),
            lock_pool_capacity: 20,
            lock_pool_initial_fill: 1,
            lock_timeout_secs: 30,
            fetch_timeout_secs: 15,
            fetch_parallelism: 0,
            image_ttl_secs: 600,
            template_ttl_secs: 600,
            image_cache_mb: 512,
            template_cache_mb: 512,
            request_timeout_secs: 60,
            purge_interval_secs: 60,
            memory_limit_mb: 0,
            memory_pressure_threshold: 0.85,
            memory_pressure_target: 0.70,
            memory_check_interval_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_yaml(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override fields from `lookup`, which maps variable names to values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("ASSETS_DIR") {
            self.assets_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        let number = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(v) = number("LOCK_POOL_CAPACITY") {
            self.lock_pool_capacity = v as usize;
        }
        if let Some(v) = number("LOCK_TIMEOUT_SECS") {
            self.lock_timeout_secs = v;
        }
        if let Some(v) = number("FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = number("FETCH_PARALLELISM") {
            self.fetch_parallelism = v as usize;
        }
        if let Some(v) = number("IMAGE_CACHE_MB") {
            self.image_cache_mb = v;
        }
        if let Some(v) = number("TEMPLATE_CACHE_MB") {
            self.template_cache_mb = v;
        }
        if let Some(v) = number("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v;
        }
        if let Some(v) = number("MEMORY_LIMIT_MB") {
            self.memory_limit_mb = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.memory_pressure_threshold)
            || !(0.0..=1.0).contains(&self.memory_pressure_target)
        {
            anyhow::bail!("memory pressure threshold and target must be between 0 and 1");
        }
        if self.memory_pressure_target > self.memory_pressure_threshold {
            anyhow::bail!(
                "memory_pressure_target ({}) must not exceed memory_pressure_threshold ({})",
                self.memory_pressure_target,
                self.memory_pressure_threshold
            );
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn asset_path(&self, relative: &str) -> PathBuf {
        self.assets_dir.join(relative)
    }

    pub fn data_path(&self, relative: &str) -> PathBuf {
        self.data_dir.join(relative)
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_secs > 0).then(|| Duration::from_secs(self.lock_timeout_secs))
    }

    pub fn fetch_parallelism(&self) -> usize {
        if self.fetch_parallelism > 0 {
            self.fetch_parallelism
        } else {
            (num_cpus::get() / 2).max(1)
        }
    }
}
