//! Fetcher Builder
//!
//! Binds a strategy to its collaborators: store, codec, key hasher,
//! background pool, metrics and logging span.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{info_span, Span};

use super::base::FetcherCore;
use super::refresh_ahead::validate_factor;
use super::{CachedFetcher, ReadThroughFetcher, RefreshAheadFetcher, DEFAULT_REFRESH_AHEAD_FACTOR};
use crate::cache::{CacheEntry, CacheStore, Codec, DefaultKeyHasher, FetchMetrics, JsonCodec, KeyHasher};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::single_flight::{compute_fn, SingleFlight};
use crate::tasks::TaskPool;

// == Strategy ==
/// Which caching strategy a fetcher implements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Compute on a miss, then serve from the store
    ReadThrough,
    /// Also recompute in the background once `factor * ttl` has elapsed
    RefreshAhead { factor: f64 },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ReadThrough => "read_through",
            Strategy::RefreshAhead { .. } => "refresh_ahead",
        }
    }
}

impl FromStr for Strategy {
    type Err = CacheError;

    /// Parses `read_through` or `refresh_ahead` (dashes accepted). The
    /// refresh-ahead factor defaults to [`DEFAULT_REFRESH_AHEAD_FACTOR`].
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "read_through" => Ok(Strategy::ReadThrough),
            "refresh_ahead" => Ok(Strategy::RefreshAhead {
                factor: DEFAULT_REFRESH_AHEAD_FACTOR,
            }),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown caching strategy: {other}"
            ))),
        }
    }
}

// == Fetcher Builder ==
/// Assembles fetchers.
///
/// Every collaborator is passed in explicitly; anything left unset gets a
/// default: [`JsonCodec`], [`DefaultKeyHasher`], a fresh [`TaskPool`] sized
/// from [`Config::default`], fresh metrics and an `info`-level span named
/// after the strategy.
pub struct FetcherBuilder<K, V> {
    store: Arc<dyn CacheStore>,
    codec: Arc<dyn Codec<CacheEntry<V>>>,
    hasher: Arc<dyn KeyHasher<K>>,
    pool: Option<TaskPool>,
    metrics: Arc<FetchMetrics>,
    span: Option<Span>,
}

impl<K, V> FetcherBuilder<K, V>
where
    K: Hash + 'static,
    V: Serialize + DeserializeOwned + 'static,
{
    /// Creates a builder persisting JSON encoded entries into `store`.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_codec(store, Arc::new(JsonCodec::<CacheEntry<V>>::new()))
    }

    /// Creates a builder whose background pool is sized from `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &Config, store: Arc<dyn CacheStore>) -> Self {
        Self::new(store).pool(TaskPool::from_config(config))
    }
}

impl<K, V> FetcherBuilder<K, V>
where
    K: Hash + 'static,
{
    /// Creates a builder with a custom codec; no serde bounds on `V`.
    pub fn with_codec(store: Arc<dyn CacheStore>, codec: Arc<dyn Codec<CacheEntry<V>>>) -> Self {
        Self {
            store,
            codec,
            hasher: Arc::new(DefaultKeyHasher),
            pool: None,
            metrics: Arc::new(FetchMetrics::new()),
            span: None,
        }
    }
}

impl<K, V> FetcherBuilder<K, V> {
    pub fn codec(mut self, codec: Arc<dyn Codec<CacheEntry<V>>>) -> Self {
        self.codec = codec;
        self
    }

    /// Overrides how application keys map to store keys.
    pub fn hasher(mut self, hasher: Arc<dyn KeyHasher<K>>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Runs background writes and refreshes on `pool`, which may be shared.
    pub fn pool(mut self, pool: TaskPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Records counters into `metrics`, which may be shared.
    pub fn metrics(mut self, metrics: Arc<FetchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Emits all of the fetcher's logs, background jobs included, inside `span`.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl<K, V> FetcherBuilder<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Build ==
    /// Builds a fetcher for `strategy` computing missing entries with `compute`.
    ///
    /// Fails with [`CacheError::InvalidConfig`] for a refresh-ahead factor
    /// outside `[0, 1]`, before anything is spawned.
    ///
    /// Must be called from within a tokio runtime unless a pool was supplied.
    pub fn build<F, Fut>(self, strategy: Strategy, compute: F) -> Result<Arc<dyn CachedFetcher<K, V>>>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CacheEntry<V>>> + Send + 'static,
    {
        match strategy {
            Strategy::ReadThrough => Ok(Arc::new(self.build_read_through(compute))),
            Strategy::RefreshAhead { factor } => {
                Ok(Arc::new(self.build_refresh_ahead(factor, compute)?))
            }
        }
    }

    pub fn build_read_through<F, Fut>(self, compute: F) -> ReadThroughFetcher<K, V>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CacheEntry<V>>> + Send + 'static,
    {
        ReadThroughFetcher::new(self.into_core(Strategy::ReadThrough, compute))
    }

    pub fn build_refresh_ahead<F, Fut>(
        self,
        factor: f64,
        compute: F,
    ) -> Result<RefreshAheadFetcher<K, V>>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CacheEntry<V>>> + Send + 'static,
    {
        validate_factor(factor)?;
        let core = self.into_core(Strategy::RefreshAhead { factor }, compute);
        RefreshAheadFetcher::new(core, factor)
    }

    fn into_core<F, Fut>(self, strategy: Strategy, compute: F) -> FetcherCore<K, V>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CacheEntry<V>>> + Send + 'static,
    {
        let pool = self.pool.unwrap_or_else(|| TaskPool::from_config(&Config::default()));
        let span = self
            .span
            .unwrap_or_else(|| info_span!("fetcher", strategy = strategy.name()));
        let flight = SingleFlight::new(compute_fn(compute), Arc::clone(&self.metrics));

        FetcherCore::new(
            self.store,
            self.codec,
            self.hasher,
            flight,
            pool,
            self.metrics,
            span,
        )
    }
}
