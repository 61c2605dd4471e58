//! kache demo
//!
//! Puts the configured caching strategy in front of a slow simulated lookup
//! and shows stampede prevention and cache hits in the logs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kache::{Config, ExpiryStore, FetcherBuilder, TaskPool};

/// Simulated remote lookup latency
const LOOKUP_LATENCY: Duration = Duration::from_millis(200);

/// Number of concurrent callers asking for the same key
const CONCURRENT_CALLERS: usize = 8;

/// Runs the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the store, background pool and fetcher
/// 4. Issue concurrent requests for one key, then repeat reads
/// 5. Log statistics and drain background work
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: strategy={}, refresh_ahead_factor={}, default_ttl={}s, workers={}, queue={}",
        config.strategy,
        config.refresh_ahead_factor,
        config.default_ttl,
        config.background_workers,
        config.background_queue_capacity
    );

    let strategy = config.strategy().context("invalid CACHE_STRATEGY")?;
    let pool = TaskPool::from_config(&config);
    let entries = Arc::new(config.clone());

    let fetcher = FetcherBuilder::<u64, u64>::new(Arc::new(ExpiryStore::new()))
        .pool(pool.clone())
        .build(strategy, move |n: u64| {
            let entries = Arc::clone(&entries);
            async move {
                info!("Performing slow lookup for {}", n);
                tokio::time::sleep(LOOKUP_LATENCY).await;
                Ok(entries.entry(n * n))
            }
        })
        .context("failed to build fetcher")?;

    let callers: Vec<_> = (0..CONCURRENT_CALLERS)
        .map(|_| {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.get(12).await })
        })
        .collect();
    for caller in callers {
        let entry = caller.await.context("caller task failed")??;
        info!("Concurrent caller received {:?}", entry.result);
    }

    // Let the background write land before reading again
    tokio::time::sleep(Duration::from_millis(50)).await;
    for _ in 0..3 {
        let entry = fetcher.get(12).await?;
        info!("Repeated read received {:?}", entry.result);
    }

    let stats = fetcher.stats();
    info!(
        "Stats: {} (hit rate {:.2})",
        serde_json::to_string(&stats)?,
        stats.hit_rate()
    );

    pool.shutdown().await;
    info!("Demo complete");
    Ok(())
}
