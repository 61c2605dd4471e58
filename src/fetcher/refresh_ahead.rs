//! Refresh-ahead strategy
//!
//! Recomputes a value before it expires. Each successful computation writes
//! a marker record whose TTL is a fraction of the entry's TTL; once the
//! marker has expired, the next read schedules a background refresh while
//! still returning the current value.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn, Instrument};

use super::base::FetcherCore;
use super::CachedFetcher;
use crate::cache::{CacheEntry, CacheStats};
use crate::error::{CacheError, Result};
use crate::single_flight::CompletionFn;
use crate::utils::CallOnDrop;

/// Refresh point used when none is configured.
pub const DEFAULT_REFRESH_AHEAD_FACTOR: f64 = 0.5;

/// Keeps values warm by recomputing them ahead of expiry.
///
/// The larger `refresh_ahead_factor`, the longer a value is served before a
/// refresh is scheduled. `0.0` refreshes on every read, `1.0` refreshes only
/// once the entry itself is about to expire.
pub struct RefreshAheadFetcher<K, V> {
    core: FetcherCore<K, V>,
    refresh_ahead_factor: f64,
    /// Keys with a refresh scheduled or running
    refreshing: Arc<Mutex<HashSet<K>>>,
    /// Persists the entry and its marker after every computation
    write_back: CompletionFn<K, V>,
}

impl<K, V> RefreshAheadFetcher<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Fails with [`CacheError::InvalidConfig`] unless the factor is within `[0, 1]`.
    pub(crate) fn new(core: FetcherCore<K, V>, refresh_ahead_factor: f64) -> Result<Self> {
        validate_factor(refresh_ahead_factor)?;

        let writer = core.clone();
        let write_back: CompletionFn<K, V> = Arc::new(move |key, entry| {
            let store_key = writer.store_key(&key);
            let marker_ttl = marker_ttl(entry.ttl, refresh_ahead_factor);
            writer.cache_result(key, entry);

            let marker_writer = writer.clone();
            writer.pool.spawn(
                async move { marker_writer.write_marker(&store_key, marker_ttl).await }
                    .instrument(writer.span.clone()),
            );
        });

        Ok(Self {
            core,
            refresh_ahead_factor,
            refreshing: Default::default(),
            write_back,
        })
    }

    pub fn refresh_ahead_factor(&self) -> f64 {
        self.refresh_ahead_factor
    }

    // == Schedule Refresh ==
    /// Starts a background recomputation of `key` unless one is already
    /// running. The computation runs on its own task; only its write-back
    /// and marker go through the pool, so slow refreshes never occupy a
    /// pool worker.
    fn schedule_refresh(&self, key: K) {
        if !self.refreshing.lock().insert(key.clone()) {
            debug!(?key, "Refresh already scheduled");
            return;
        }
        debug!(?key, "Scheduling refresh");
        self.core.metrics.record_refresh();

        let refreshing = Arc::clone(&self.refreshing);
        let guarded_key = key.clone();
        let release = CallOnDrop::new(move || {
            refreshing.lock().remove(&guarded_key);
        });

        let computation = self
            .core
            .flight
            .compute(key.clone(), Some(Arc::clone(&self.write_back)));
        tokio::spawn(
            async move {
                let _release = release;
                if let Err(err) = computation.await {
                    warn!(?key, "Refresh failed: {}", err);
                }
            }
            .instrument(self.core.span.clone()),
        );
    }
}

#[async_trait]
impl<K, V> CachedFetcher<K, V> for RefreshAheadFetcher<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn fetch_result(&self, key: K) -> Result<CacheEntry<V>> {
        async move {
            let store_key = self.core.store_key(&key);
            let refresh_due = self.core.refresh_due(&store_key).await;

            if let Some(entry) = self.core.get_value_from_cache(&key).await {
                if refresh_due {
                    self.schedule_refresh(key);
                }
                return Ok(entry);
            }

            // Nothing to serve yet: compute in the foreground. The write-back
            // also writes the marker, so this counts as the first refresh.
            debug!(?key, "Cold miss, recomputing value");
            self.core
                .flight
                .compute(key, Some(Arc::clone(&self.write_back)))
                .await
        }
        .instrument(self.core.span.clone())
        .await
    }

    fn stats(&self) -> CacheStats {
        self.core.stats()
    }
}

pub(crate) fn validate_factor(factor: f64) -> Result<()> {
    if (0.0..=1.0).contains(&factor) {
        Ok(())
    } else {
        Err(CacheError::InvalidConfig(format!(
            "refresh_ahead_factor must be between 0 and 1 inclusive, got {factor}"
        )))
    }
}

/// Marker lifetime: `ttl * factor`, keeping fractional seconds.
fn marker_ttl(ttl_secs: u64, factor: f64) -> Duration {
    Duration::try_from_secs_f64(ttl_secs as f64 * factor).unwrap_or(Duration::MAX)
}
