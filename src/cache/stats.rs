//! Cache Statistics Module
//!
//! Tracks fetcher behaviour: hits, misses, computations, refreshes and the
//! failures that were absorbed as misses.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Fetch Metrics ==
/// Live counters shared by fetchers, their single-flight computers and
/// background jobs. Several fetchers may share one instance.
#[derive(Debug, Default)]
pub struct FetchMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    coalesced: AtomicU64,
    refreshes: AtomicU64,
    store_errors: AtomicU64,
    decode_errors: AtomicU64,
    collisions: AtomicU64,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A single-flight initiator started the user computation.
    pub fn record_computation(&self) {
        self.computations.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller joined a computation that was already running.
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the counters into a [`CacheStats`].
    ///
    /// `dropped_tasks` comes from the background pool, which counts its own
    /// rejections.
    pub fn snapshot(&self, dropped_tasks: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            dropped_tasks,
        }
    }
}

// == Cache Stats ==
/// Point-in-time view of [`FetchMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from the store or the collision cache
    pub hits: u64,
    /// Reads that found nothing usable
    pub misses: u64,
    /// Executions of the user computation
    pub computations: u64,
    /// Callers that waited on another caller's computation
    pub coalesced: u64,
    /// Refresh-ahead recomputations scheduled
    pub refreshes: u64,
    /// Store calls that failed and were treated as misses
    pub store_errors: u64,
    /// Stored blobs that could not be decoded
    pub decode_errors: u64,
    /// Stored blobs that belonged to a different key
    pub collisions: u64,
    /// Background jobs rejected because the pool was full or closed
    pub dropped_tasks: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = FetchMetrics::new().snapshot(0);
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let metrics = FetchMetrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        assert_eq!(metrics.snapshot(0).hit_rate(), 1.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let metrics = FetchMetrics::new();
        metrics.record_hit();
        metrics.record_miss();
        assert_eq!(metrics.snapshot(0).hit_rate(), 0.5);
    }

    #[test]
    fn test_snapshot_copies_every_counter() {
        let metrics = FetchMetrics::new();
        metrics.record_computation();
        metrics.record_coalesced();
        metrics.record_coalesced();
        metrics.record_refresh();
        metrics.record_store_error();
        metrics.record_decode_error();
        metrics.record_collision();

        let stats = metrics.snapshot(3);
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.store_errors, 1);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.collisions, 1);
        assert_eq!(stats.dropped_tasks, 3);
    }

    #[test]
    fn test_stats_serialize() {
        let json = serde_json::to_value(CacheStats::default()).unwrap();
        assert_eq!(json["dropped_tasks"], 0);
        assert_eq!(json["hits"], 0);
    }
}
