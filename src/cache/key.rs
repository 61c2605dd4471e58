//! Store Key Module
//!
//! Derives store keys from application keys, and the fingerprints used to
//! tell two application keys apart when their store keys collide.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Suffix appended to a store key to form its refresh marker key.
pub const MARKER_SUFFIX: &str = "+marker";

/// Length in bytes of the fingerprint prefixed to every persisted blob.
pub const FINGERPRINT_LEN: usize = 8;

const FINGERPRINT_SALT: &str = "kache-fingerprint";

// == Key Hasher Trait ==
/// Maps an application key to the string it is stored under.
///
/// Must be deterministic. Collisions are tolerated: the fetch path detects
/// them and never returns another key's value.
pub trait KeyHasher<K: ?Sized>: Send + Sync + 'static {
    fn store_key(&self, key: &K) -> String;
}

// == Default Key Hasher ==
/// Hashes keys with their [`Hash`] impl and renders the result as hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyHasher;

impl<K: Hash + ?Sized> KeyHasher<K> for DefaultKeyHasher {
    fn store_key(&self, key: &K) -> String {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Any `Fn(&K) -> String` closure can derive store keys.
impl<K, F> KeyHasher<K> for F
where
    K: ?Sized,
    F: Fn(&K) -> String + Send + Sync + 'static,
{
    fn store_key(&self, key: &K) -> String {
        self(key)
    }
}

/// Returns the refresh marker key belonging to `store_key`.
pub fn marker_key(store_key: &str) -> String {
    format!("{store_key}{MARKER_SUFFIX}")
}

/// A salted hash of `key`, independent of whichever [`KeyHasher`] is used.
pub fn fingerprint<K: Hash + ?Sized>(key: &K) -> [u8; FINGERPRINT_LEN] {
    let mut hasher = DefaultHasher::new();
    FINGERPRINT_SALT.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish().to_le_bytes()
}
