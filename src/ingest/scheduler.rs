// src/ingest/scheduler.rs
//! The background refresh loop.
//!
//! One cycle is fetch → normalize → install → save. After a good cycle the
//! loop sleeps for the refresh interval; after a failed fetch it sleeps for
//! whatever the [`RetryPolicy`] says and tries again, forever. Both the
//! cycle itself (page requests and the delays between them) and every sleep
//! listen for shutdown so tests and graceful exits don't have to wait.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::persist::SnapshotPersistence;
use crate::cache::{CacheStore, Snapshot};
use crate::error::FetchError;
use crate::ingest::fetcher::PaginatedFetcher;
use crate::ingest::normalize::normalize_batch;
use crate::ingest::render::Renderer;
use crate::ingest::types::ListingsSource;

/// How long to wait before retrying after `consecutive_failures` failed cycles (≥ 1).
pub trait RetryPolicy: Send + Sync {
    fn delay(&self, consecutive_failures: u32) -> Duration;
}

/// Same wait after every failure.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl RetryPolicy for FixedBackoff {
    fn delay(&self, _consecutive_failures: u32) -> Duration {
        self.0
    }
}

/// `base`, `2*base`, `4*base`, … capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, consecutive_failures: u32) -> Duration {
        let shift = consecutive_failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
    Normalizing,
    Installing,
    Sleeping,
    Backoff,
}

/// What one successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub pages: usize,
    pub fetched: usize,
    pub kept: usize,
    pub dropped: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct RefreshSchedulerCfg {
    pub interval: Duration,
}

pub struct Refresher {
    source: Arc<dyn ListingsSource>,
    fetcher: PaginatedFetcher,
    renderer: Arc<dyn Renderer>,
    store: CacheStore,
    persistence: Arc<dyn SnapshotPersistence>,
    retry: Arc<dyn RetryPolicy>,
    cfg: RefreshSchedulerCfg,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn ListingsSource>,
        renderer: Arc<dyn Renderer>,
        store: CacheStore,
        persistence: Arc<dyn SnapshotPersistence>,
    ) -> Self {
        crate::ingest::ensure_metrics_described();
        Self {
            source,
            fetcher: PaginatedFetcher::default(),
            renderer,
            store,
            persistence,
            retry: Arc::new(FixedBackoff(Duration::from_secs(60))),
            cfg: RefreshSchedulerCfg {
                interval: Duration::from_secs(3600),
            },
        }
    }

    pub fn with_fetcher(mut self, fetcher: PaginatedFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.cfg.interval = interval;
        self
    }

    fn enter(&self, state: RefreshState) {
        tracing::debug!(target: "refresh", ?state, "refresh state");
    }

    /// One fetch → normalize → install → save pass.
    ///
    /// On error the installed snapshot is left exactly as it was.
    pub async fn run_cycle(&self) -> Result<CycleReport, FetchError> {
        self.enter(RefreshState::Fetching);
        let outcome = self.fetcher.fetch_all(self.source.as_ref()).await?;
        let fetched = outcome.listings.len();

        self.enter(RefreshState::Normalizing);
        let (listings, dropped) = normalize_batch(outcome.listings, self.renderer.as_ref());
        let kept = listings.len();
        let snapshot = Snapshot::new(outcome.copyright, listings);

        self.enter(RefreshState::Installing);
        self.store.replace(snapshot);
        // save what readers now see, not a second copy
        let installed = self.store.current();
        if let Err(e) = self.persistence.save(&installed).await {
            tracing::warn!(target: "refresh", error = %e, "saving snapshot failed; keeping in-memory copy");
        }

        counter!("refresh_cycles_total").increment(1);
        counter!("refresh_dropped_total").increment(dropped as u64);
        gauge!("refresh_snapshot_listings").set(kept as f64);
        gauge!("refresh_last_success_ts").set(chrono::Utc::now().timestamp() as f64);

        Ok(CycleReport {
            pages: outcome.pages,
            fetched,
            kept,
            dropped,
        })
    }

    /// Loop until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut failures = 0u32;
        self.enter(RefreshState::Idle);
        loop {
            // a cycle dropped mid-save leaves the previous file in place
            let cycle = tokio::select! {
                res = self.run_cycle() => res,
                _ = shutdown_requested(&mut shutdown) => break,
            };
            let wait = match cycle {
                Ok(report) => {
                    failures = 0;
                    tracing::info!(
                        target: "refresh",
                        source = self.source.name(),
                        pages = report.pages,
                        fetched = report.fetched,
                        kept = report.kept,
                        dropped = report.dropped,
                        "refresh cycle installed"
                    );
                    self.enter(RefreshState::Sleeping);
                    self.cfg.interval
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    counter!("refresh_failures_total").increment(1);
                    let delay = self.retry.delay(failures);
                    tracing::warn!(
                        target: "refresh",
                        error = %e,
                        failures,
                        retry_in_secs = delay.as_secs_f64(),
                        "refresh cycle failed"
                    );
                    self.enter(RefreshState::Backoff);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!(target: "refresh", "refresh loop stopped");
    }

    /// Spawn the loop on the tokio runtime.
    pub fn spawn(self) -> RefreshHandle {
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn(self.run(rx));
        RefreshHandle { shutdown: tx, join }
    }
}

/// Resolves once shutdown is signalled. If every sender is gone nobody can
/// ask for shutdown any more, so this never resolves.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Owner of a spawned refresh loop. Dropping it detaches the loop, which
/// then runs for the rest of the process.
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RefreshHandle {
    /// Ask the loop to stop and wait until it has.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!(target: "refresh", error = %e, "refresh task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_is_constant() {
        let p = FixedBackoff(Duration::from_secs(60));
        assert_eq!(p.delay(1), Duration::from_secs(60));
        assert_eq!(p.delay(50), Duration::from_secs(60));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let p = ExponentialBackoff {
            base: Duration::from_secs(10),
            max: Duration::from_secs(100),
        };
        assert_eq!(p.delay(1), Duration::from_secs(10));
        assert_eq!(p.delay(2), Duration::from_secs(20));
        assert_eq!(p.delay(4), Duration::from_secs(80));
        assert_eq!(p.delay(5), Duration::from_secs(100));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(100));
    }
}
