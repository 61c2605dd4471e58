//! kache - A caching engine for expensive computations
//!
//! Places read-through or refresh-ahead caching in front of a computation,
//! deduplicating concurrent computations per key and persisting results
//! into a pluggable byte store with lazy TTL expiry.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod single_flight;
pub mod tasks;
mod utils;

pub use cache::{CacheEntry, CacheStats, CacheStore, ExpiryStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use fetcher::{CachedFetcher, FetcherBuilder, Strategy};
pub use single_flight::SingleFlight;
pub use tasks::TaskPool;
