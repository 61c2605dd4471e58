//! Cache Entry Module
//!
//! Defines the result of a cached computation together with its TTL.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// TTL in seconds applied by [`CacheEntry::with_default_ttl`].
pub const DEFAULT_TTL_SECS: u64 = 900;

// == Cache Entry ==
/// The outcome of one computation, as stored and returned by fetchers.
///
/// A `result` of `None` means the computation ran and produced no value,
/// which is cached like any other outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The computed value, if any
    pub result: Option<V>,
    /// Time to live in seconds
    pub ttl: u64,
    /// When the computation completed
    pub last_updated: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    // == Constructors ==
    /// Creates an entry holding `result` that lives for `ttl_seconds`.
    pub fn of(result: V, ttl_seconds: u64) -> Self {
        Self {
            result: Some(result),
            ttl: ttl_seconds,
            last_updated: Utc::now(),
        }
    }

    /// Creates an entry holding `result` with [`DEFAULT_TTL_SECS`].
    pub fn with_default_ttl(result: V) -> Self {
        Self::of(result, DEFAULT_TTL_SECS)
    }

    /// Creates an entry recording that the computation produced no value.
    pub fn empty(ttl_seconds: u64) -> Self {
        Self {
            result: None,
            ttl: ttl_seconds,
            last_updated: Utc::now(),
        }
    }

    // == Is Expired ==
    /// Checks whether the entry's own TTL has elapsed on the wall clock.
    ///
    /// Stores and fetchers enforce expiry on the runtime clock themselves;
    /// this tells a caller how old an entry it received is.
    pub fn is_expired(&self) -> bool {
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        match ChronoDuration::try_seconds(ttl)
            .and_then(|ttl| self.last_updated.checked_add_signed(ttl))
        {
            Some(expires) => Utc::now() >= expires,
            None => false,
        }
    }

    /// Borrows the computed value, if any.
    pub fn value(&self) -> Option<&V> {
        self.result.as_ref()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_of() {
        let entry = CacheEntry::of("value".to_string(), 60);

        assert_eq!(entry.value(), Some(&"value".to_string()));
        assert_eq!(entry.ttl, 60);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_default_ttl() {
        let entry = CacheEntry::with_default_ttl(7u32);
        assert_eq!(entry.ttl, DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_entry_empty_is_distinct_from_missing() {
        let entry: CacheEntry<u32> = CacheEntry::empty(30);

        assert!(entry.result.is_none());
        assert_eq!(entry.ttl, 30);
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let entry = CacheEntry::of(1u8, 0);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let mut entry = CacheEntry::of(1u8, 10);
        entry.last_updated = Utc::now() - ChronoDuration::seconds(10);

        assert!(entry.is_expired(), "Entry should be expired at boundary");
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let entry = CacheEntry::of(1u8, u64::MAX);
        assert!(!entry.is_expired());
    }
}
