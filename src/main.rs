//! Listings cache service binary entrypoint.
//! Boots the Axum HTTP server and the background refresh loop.

use listings_cache::{metrics::Metrics, CacheConfig};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs for local runs. Shuttle installs its own subscriber in
/// deployed environments, in which case this is a no-op.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("listings_cache=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = CacheConfig::load_default()?;
    tracing::info!(
        endpoint = %cfg.endpoint,
        cache_file = %cfg.cache_file.display(),
        refresh_secs = cfg.refresh_interval_secs,
        "listings cache starting up"
    );

    let metrics = Metrics::init()?;
    // Dropping the refresh handle detaches the loop; it runs for the life of the process.
    let (router, _refresh) = listings_cache::start(&cfg).await?;

    Ok(router.merge(metrics.router()).into())
}
