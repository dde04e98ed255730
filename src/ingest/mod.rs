// src/ingest/mod.rs
pub mod fetcher;
pub mod normalize;
pub mod providers;
pub mod render;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_pages_total", "Listing pages requested from upstream.");
        describe_histogram!("fetch_page_ms", "Upstream page request time in milliseconds.");
        describe_counter!(
            "refresh_cycles_total",
            "Refresh cycles that installed a new snapshot."
        );
        describe_counter!(
            "refresh_failures_total",
            "Refresh cycles aborted by a fetch error."
        );
        describe_counter!(
            "refresh_dropped_total",
            "Listings dropped for missing or invalid coordinates."
        );
        describe_gauge!(
            "refresh_snapshot_listings",
            "Listings in the currently installed snapshot."
        );
        describe_gauge!(
            "refresh_last_success_ts",
            "Unix ts of the last installed snapshot."
        );
        describe_counter!("search_requests_total", "Bounding-box searches received.");
        describe_counter!(
            "search_rejected_total",
            "Searches rejected for missing or invalid bounds."
        );
    });
}
