//! Fetcher Module
//!
//! Caching strategies placed in front of an expensive computation.
//!
//! # Strategies
//! - [`ReadThroughFetcher`]: compute on a miss, serve from the store after
//! - [`RefreshAheadFetcher`]: additionally recompute ahead of expiry,
//!   serving the current value while the refresh runs

mod base;
mod builder;
mod read_through;
mod refresh_ahead;

use async_trait::async_trait;

use crate::cache::{CacheEntry, CacheStats};
use crate::error::Result;

pub use builder::{FetcherBuilder, Strategy};
pub use read_through::ReadThroughFetcher;
pub use refresh_ahead::{RefreshAheadFetcher, DEFAULT_REFRESH_AHEAD_FACTOR};

// == Cached Fetcher Trait ==
/// Fetches results for keys, caching them according to a strategy.
#[async_trait]
pub trait CachedFetcher<K, V>: Send + Sync
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Strategy specific lookup. Callers use [`CachedFetcher::get`].
    async fn fetch_result(&self, key: K) -> Result<CacheEntry<V>>;

    /// Returns the entry for `key`, computing it if nothing usable is cached.
    ///
    /// Only a failed computation is reported as an error; every failure of
    /// the store or codec is treated as a cache miss.
    async fn get(&self, key: K) -> Result<CacheEntry<V>> {
        self.fetch_result(key).await
    }

    /// Snapshot of this fetcher's counters.
    fn stats(&self) -> CacheStats;
}
