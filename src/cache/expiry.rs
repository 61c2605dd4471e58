//! Expiry Map Module
//!
//! A concurrent map whose entries may carry an absolute expiry instant.
//! Expiry is enforced lazily: an entry is only removed when it is read
//! after its deadline, there is no background sweep.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Inner<K, V> {
    values: HashMap<K, V>,
    expirations: HashMap<K, Instant>,
}

// == Expiry Map ==
/// Values and their expiry instants, keyed identically.
///
/// Both maps sit behind one lock so that an eviction on read can never
/// remove a value that a concurrent `put` has just replaced.
#[derive(Debug)]
pub struct ExpiryMap<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> Default for ExpiryMap<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                values: HashMap::new(),
                expirations: HashMap::new(),
            }),
        }
    }
}

impl<K: Hash + Eq, V: Clone> ExpiryMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Returns the value for `key` unless it is missing or expired.
    ///
    /// An entry whose deadline is at or before now is removed from both
    /// maps before `None` is returned.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        if evict_if_expired(&mut inner, key) {
            return None;
        }
        inner.values.get(key).cloned()
    }

    // == Contains Key ==
    /// Checks for an unexpired entry, evicting it if its deadline passed.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        !evict_if_expired(&mut inner, key) && inner.values.contains_key(key)
    }

    // == Put ==
    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// With a `ttl` the entry expires at `now + ttl`; without one it never
    /// expires, even if the entry it replaces had a deadline.
    pub fn put(&self, key: K, value: V, ttl: Option<Duration>) -> Option<V>
    where
        K: Clone,
    {
        let mut inner = self.inner.lock();
        match ttl {
            Some(ttl) => {
                // Saturate absurd TTLs instead of overflowing the clock
                let deadline = Instant::now()
                    .checked_add(ttl)
                    .unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX as u64));
                inner.expirations.insert(key.clone(), deadline);
            }
            None => {
                inner.expirations.remove(&key);
            }
        }
        inner.values.insert(key, value)
    }

    // == Remove ==
    /// Removes `key` from both maps. Removing a missing key is a no-op.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        inner.expirations.remove(key);
        inner.values.remove(key)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.expirations.clear();
        inner.values.clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().values.is_empty()
    }
}

/// Removes `key` if its deadline has passed. Returns whether it did.
fn evict_if_expired<K, V, Q>(inner: &mut Inner<K, V>, key: &Q) -> bool
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
{
    match inner.expirations.get(key) {
        Some(deadline) if *deadline <= Instant::now() => {
            inner.expirations.remove(key);
            inner.values.remove(key);
            true
        }
        _ => false,
    }
}
