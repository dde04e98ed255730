// src/config/listings.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::fetcher::{PaginatedFetcher, DEFAULT_PAGE_SIZE};
use crate::ingest::providers::nyt_events::{ListingsQuery, DEFAULT_ENDPOINT};
use crate::ingest::scheduler::{ExponentialBackoff, FixedBackoff, RetryPolicy};

pub const ENV_CONFIG_PATH: &str = "LISTINGS_CONFIG_PATH";
pub const ENV_API_KEY: &str = "NYT_API_KEY";
pub const ENV_CACHE_FILE: &str = "LISTINGS_CACHE_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    Fixed,
    Exponential,
}

/// Everything the cache needs to know about where data comes from and how
/// often to refresh it. Every key is optional in the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub endpoint: String,
    pub api_key: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_m: u64,
    pub sort: String,
    pub page_size: usize,
    pub page_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub retry_strategy: RetryStrategy,
    pub retry_backoff_secs: u64,
    pub retry_max_backoff_secs: u64,
    pub cache_file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let q = ListingsQuery::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            center_lat: q.center_lat,
            center_lng: q.center_lng,
            radius_m: q.radius_m,
            sort: q.sort,
            page_size: DEFAULT_PAGE_SIZE,
            page_delay_ms: 1_000,
            request_timeout_secs: 30,
            refresh_interval_secs: 3_600,
            retry_strategy: RetryStrategy::Fixed,
            retry_backoff_secs: 60,
            retry_max_backoff_secs: 3_600,
            cache_file: PathBuf::from("./events.json"),
        }
    }
}

impl CacheConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading listings config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = if ext == "json" {
            serde_json::from_str::<Self>(&content).context("parsing listings config json")?
        } else {
            toml::from_str::<Self>(&content).context("parsing listings config toml")?
        };
        Ok(cfg.with_env_overrides().sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $LISTINGS_CONFIG_PATH
    /// 2) config/listings.toml
    /// 3) config/listings.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in ["config/listings.toml", "config/listings.json"] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default().with_env_overrides().sanitized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.trim().is_empty() {
                self.api_key = key.trim().to_string();
            }
        }
        if let Ok(file) = std::env::var(ENV_CACHE_FILE) {
            if !file.trim().is_empty() {
                self.cache_file = PathBuf::from(file.trim());
            }
        }
        self
    }

    fn sanitized(mut self) -> Self {
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        if self.retry_max_backoff_secs < self.retry_backoff_secs {
            self.retry_max_backoff_secs = self.retry_backoff_secs;
        }
        self
    }

    pub fn query(&self) -> ListingsQuery {
        ListingsQuery {
            center_lat: self.center_lat,
            center_lng: self.center_lng,
            radius_m: self.radius_m,
            sort: self.sort.clone(),
        }
    }

    pub fn fetcher(&self) -> PaginatedFetcher {
        PaginatedFetcher::new(self.page_size, Duration::from_millis(self.page_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        let base = Duration::from_secs(self.retry_backoff_secs);
        match self.retry_strategy {
            RetryStrategy::Fixed => Arc::new(FixedBackoff(base)),
            RetryStrategy::Exponential => Arc::new(ExponentialBackoff {
                base,
                max: Duration::from_secs(self.retry_max_backoff_secs),
            }),
        }
    }
}
