// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod query;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::cache::{persist::JsonFileStore, CacheStore, Snapshot};
pub use crate::config::CacheConfig;
pub use crate::ingest::scheduler::{RefreshHandle, Refresher};

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tracing::info;

use crate::cache::persist::SnapshotPersistence;
use crate::ingest::providers::nyt_events::NytEventsSource;
use crate::ingest::render::HtmlRenderer;

/// Wire the whole service from `cfg`: restore the saved snapshot, start the
/// refresh loop, and build the router serving it.
///
/// A saved snapshot that exists but can't be read is fatal; a missing one
/// just means starting empty.
pub async fn start(cfg: &CacheConfig) -> anyhow::Result<(Router, RefreshHandle)> {
    let persistence = Arc::new(JsonFileStore::new(cfg.cache_file.clone()));
    let snapshot = persistence
        .load()
        .await
        .with_context(|| format!("loading snapshot from {}", cfg.cache_file.display()))?;
    info!(listings = snapshot.len(), "cache initialised");

    let store = CacheStore::new(snapshot);
    if cfg.api_key.is_empty() {
        tracing::warn!("no NYT_API_KEY configured; upstream will likely reject requests");
    }

    let refresher = Refresher::new(
        Arc::new(NytEventsSource::from_config(cfg)),
        Arc::new(HtmlRenderer),
        store.clone(),
        persistence,
    )
    .with_fetcher(cfg.fetcher())
    .with_retry_policy(cfg.retry_policy())
    .with_interval(cfg.refresh_interval());
    let handle = refresher.spawn();

    Ok((api::router(api::AppState::new(store)), handle))
}
