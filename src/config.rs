//! Configuration Module
//!
//! Handles loading engine configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::{CacheEntry, DEFAULT_TTL_SECS};
use crate::fetcher::Strategy;

/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which fetcher strategy to build
    pub strategy: String,
    /// Fraction of an entry's TTL after which refresh-ahead recomputes it
    pub refresh_ahead_factor: f64,
    /// TTL in seconds applied by [`Config::entry`]
    pub default_ttl: u64,
    /// Number of background workers persisting and refreshing entries
    pub background_workers: usize,
    /// Maximum number of queued background jobs before work is rejected
    pub background_queue_capacity: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_STRATEGY` - `read_through` or `refresh_ahead` (default: read_through)
    /// - `REFRESH_AHEAD_FACTOR` - Refresh point as a fraction of TTL (default: 0.5)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 900)
    /// - `BACKGROUND_WORKERS` - Background worker count (default: 4)
    /// - `BACKGROUND_QUEUE_CAPACITY` - Background queue bound (default: 1024)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            strategy: env::var("CACHE_STRATEGY").unwrap_or(defaults.strategy),
            refresh_ahead_factor: parse_var("REFRESH_AHEAD_FACTOR")
                .unwrap_or(defaults.refresh_ahead_factor),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            background_workers: parse_var("BACKGROUND_WORKERS")
                .unwrap_or(defaults.background_workers),
            background_queue_capacity: parse_var("BACKGROUND_QUEUE_CAPACITY")
                .unwrap_or(defaults.background_queue_capacity),
        }
    }

    /// Resolves the configured strategy name and factor into a [`Strategy`].
    ///
    /// The factor is validated when the fetcher is built, not here.
    pub fn strategy(&self) -> crate::Result<Strategy> {
        match Strategy::from_str(&self.strategy)? {
            Strategy::RefreshAhead { .. } => Ok(Strategy::RefreshAhead {
                factor: self.refresh_ahead_factor,
            }),
            other => Ok(other),
        }
    }

    /// Wraps a computed `result` in an entry carrying the configured default TTL.
    pub fn entry<V>(&self, result: V) -> CacheEntry<V> {
        CacheEntry::of(result, self.default_ttl)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: "read_through".to_string(),
            refresh_ahead_factor: 0.5,
            default_ttl: DEFAULT_TTL_SECS,
            background_workers: 4,
            background_queue_capacity: 1024,
        }
    }
}
