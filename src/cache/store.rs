//! Cache Store Module
//!
//! The byte-oriented key-value store abstraction the fetchers persist
//! into, and its default in-memory implementation.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::ExpiryMap;
use crate::error::Result;

// == Cache Store Trait ==
/// A local or remote location holding encoded cache entries.
///
/// Fetchers treat every error returned here as a cache miss, so an
/// implementation backed by the network may fail freely without taking
/// callers down.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Returns the bytes stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key` without expiry.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Stores `value` under `key`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removes `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Checks whether an unexpired value is stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;
}

// == Expiry Store ==
/// In-memory [`CacheStore`] with lazy, read-time expiry.
///
/// Entries that are never read after their deadline stay in memory until
/// they are overwritten or deleted.
#[derive(Debug, Default)]
pub struct ExpiryStore {
    entries: ExpiryMap<String, Vec<u8>>,
}

impl ExpiryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheStore for ExpiryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.put(key.to_string(), value, None);
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries.put(key.to_string(), value, Some(ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }
}
