//! Read-through strategy
//!
//! Attempts to read a value from the store; on a miss the value is
//! recomputed (once, however many callers miss concurrently), returned and
//! written back in the background.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, Instrument};

use super::base::FetcherCore;
use super::CachedFetcher;
use crate::cache::{CacheEntry, CacheStats};
use crate::error::Result;
use crate::single_flight::CompletionFn;

/// Lazily populates the store on a miss.
pub struct ReadThroughFetcher<K, V> {
    core: FetcherCore<K, V>,
    write_back: CompletionFn<K, V>,
}

impl<K, V> ReadThroughFetcher<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(core: FetcherCore<K, V>) -> Self {
        let writer = core.clone();
        let write_back: CompletionFn<K, V> =
            Arc::new(move |key, entry| writer.cache_result(key, entry));
        Self { core, write_back }
    }
}

#[async_trait]
impl<K, V> CachedFetcher<K, V> for ReadThroughFetcher<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn fetch_result(&self, key: K) -> Result<CacheEntry<V>> {
        async move {
            if let Some(entry) = self.core.get_value_from_cache(&key).await {
                return Ok(entry);
            }

            debug!(?key, "Recomputing value");
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
