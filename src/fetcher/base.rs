//! Fetcher Base
//!
//! Store lookup and write-back shared by every fetcher strategy.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument, Span};

use crate::cache::{
    fingerprint, marker_key, CacheEntry, CacheStats, CacheStore, Codec, FetchMetrics, KeyHasher,
    FINGERPRINT_LEN,
};
use crate::error::Result;
use crate::single_flight::SingleFlight;
use crate::tasks::TaskPool;
use crate::utils::CallOnDrop;

/// Collaborators and in-process state of one fetcher.
///
/// Cheap to clone; clones share all state, which lets background jobs carry
/// their own handle.
pub(crate) struct FetcherCore<K, V> {
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) codec: Arc<dyn Codec<CacheEntry<V>>>,
    pub(crate) hasher: Arc<dyn KeyHasher<K>>,
    pub(crate) flight: SingleFlight<K, V>,
    pub(crate) pool: TaskPool,
    pub(crate) metrics: Arc<FetchMetrics>,
    pub(crate) span: Span,
    /// Entries whose store write is pending or failed, keyed by application
    /// key, with the deadline derived from the entry's TTL
    collision_cache: Arc<Mutex<HashMap<K, (CacheEntry<V>, Option<Instant>)>>>,
    /// Keys with a store write currently queued or running
    writing: Arc<Mutex<HashSet<K>>>,
}

impl<K, V> Clone for FetcherCore<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            codec: Arc::clone(&self.codec),
            hasher: Arc::clone(&self.hasher),
            flight: self.flight.clone(),
            pool: self.pool.clone(),
            metrics: Arc::clone(&self.metrics),
            span: self.span.clone(),
            collision_cache: Arc::clone(&self.collision_cache),
            writing: Arc::clone(&self.writing),
        }
    }
}

impl<K, V> FetcherCore<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        store: Arc<dyn CacheStore>,
        codec: Arc<dyn Codec<CacheEntry<V>>>,
        hasher: Arc<dyn KeyHasher<K>>,
        flight: SingleFlight<K, V>,
        pool: TaskPool,
        metrics: Arc<FetchMetrics>,
        span: Span,
    ) -> Self {
        Self {
            store,
            codec,
            hasher,
            flight,
            pool,
            metrics,
            span,
            collision_cache: Default::default(),
            writing: Default::default(),
        }
    }

    pub(crate) fn store_key(&self, key: &K) -> String {
        self.hasher.store_key(key)
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.pool.rejected())
    }

    // == Get Value From Cache ==
    /// Looks `key` up in the store, falling back to the collision cache.
    ///
    /// Store errors, undecodable blobs and blobs written for a different
    /// key all count as "not in the store".
    pub(crate) async fn get_value_from_cache(&self, key: &K) -> Option<CacheEntry<V>> {
        let store_key = self.store_key(key);

        let from_store = match self.store.get(&store_key).await {
            Ok(Some(blob)) => self.decode_blob(key, &blob),
            Ok(None) => None,
            Err(err) => {
                self.metrics.record_store_error();
                warn!(%store_key, "Store read failed, treating as miss: {}", err);
                None
            }
        };

        let entry = from_store.or_else(|| self.collision_entry(key));
        if entry.is_some() {
            self.metrics.record_hit();
            debug!(?key, "Cache hit");
        } else {
            self.metrics.record_miss();
            debug!(?key, "Cache miss");
        }
        entry
    }

    fn decode_blob(&self, key: &K, blob: &[u8]) -> Option<CacheEntry<V>> {
        if blob.len() < FINGERPRINT_LEN {
            self.metrics.record_decode_error();
            warn!(?key, "Stored blob is truncated, treating as miss");
            return None;
        }

        let (stored_fingerprint, payload) = blob.split_at(FINGERPRINT_LEN);
        if stored_fingerprint != fingerprint(key).as_slice() {
            self.metrics.record_collision();
            debug!(?key, "Store key belongs to another key");
            return None;
        }

        match self.codec.decode(payload) {
            Ok(entry) => Some(entry),
            Err(err) => {
                self.metrics.record_decode_error();
                warn!(?key, "Failed to decode cached entry: {}", err);
                None
            }
        }
    }

    fn encode_blob(&self, key: &K, entry: &CacheEntry<V>) -> Result<Vec<u8>> {
        let payload = self.codec.encode(entry)?;
        let mut blob = Vec::with_capacity(FINGERPRINT_LEN + payload.len());
        blob.extend_from_slice(&fingerprint(key));
        blob.extend_from_slice(&payload);
        Ok(blob)
    }

    fn collision_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let mut collision_cache = self.collision_cache.lock();
        match collision_cache.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                collision_cache.remove(key);
                None
            }
            Some((entry, _)) => Some(entry.clone()),
            None => None,
        }
    }

    // == Cache Result ==
    /// Persists `entry` in the background. Never waits for the write.
    ///
    /// Only one write per key is in flight; a second request while one is
    /// pending is skipped. The entry stays readable from the collision
    /// cache until the store accepts it.
    pub(crate) fn cache_result(&self, key: K, entry: CacheEntry<V>) {
        debug!(?key, ttl = entry.ttl, "Caching result");

        if !self.writing.lock().insert(key.clone()) {
            debug!(?key, "Write already in progress, skipping");
            return;
        }
        // Same clock as the store, so both expire together
        let deadline = Instant::now().checked_add(Duration::from_secs(entry.ttl));
        self.collision_cache
            .lock()
            .insert(key.clone(), (entry.clone(), deadline));

        let core = self.clone();
        let job_key = key.clone();
        let job = async move {
            let writing = Arc::clone(&core.writing);
            let guarded_key = job_key.clone();
            let _release = CallOnDrop::new(move || {
                writing.lock().remove(&guarded_key);
            });
            core.persist(&job_key, &entry).await;
        }
        .instrument(self.span.clone());

        if !self.pool.spawn(job) {
            self.writing.lock().remove(&key);
        }
    }

    async fn persist(&self, key: &K, entry: &CacheEntry<V>) {
        let store_key = self.store_key(key);
        let blob = match self.encode_blob(key, entry) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(?key, "Failed to encode entry, keeping it in memory: {}", err);
                return;
            }
        };

        match self
            .store
            .set_with_expiry(&store_key, blob, Duration::from_secs(entry.ttl))
            .await
        {
            Ok(()) => {
                self.collision_cache.lock().remove(key);
                debug!(?key, %store_key, "Entry persisted");
            }
            Err(err) => {
                self.metrics.record_store_error();
                warn!(%store_key, "Store write failed, keeping entry in memory: {}", err);
            }
        }
    }

    // == Refresh Markers ==
    /// A refresh is due when the marker for `store_key` is absent.
    ///
    /// An unreachable store makes every read due; the caller's refresh guard
    /// keeps that from piling up work.
    pub(crate) async fn refresh_due(&self, store_key: &str) -> bool {
        match self.store.exists(&marker_key(store_key)).await {
            Ok(exists) => !exists,
            Err(err) => {
                self.metrics.record_store_error();
                warn!(%store_key, "Marker lookup failed, treating refresh as due: {}", err);
                true
            }
        }
    }

    pub(crate) async fn write_marker(&self, store_key: &str, ttl: Duration) {
        let marker = marker_key(store_key);
        if let Err(err) = self.store.set_with_expiry(&marker, Vec::new(), ttl).await {
            self.metrics.record_store_error();
            warn!(%marker, "Failed to write refresh marker: {}", err);
        }
    }
}
