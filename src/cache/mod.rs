//! Cache Module
//!
//! Storage-side building blocks: cache entries, the byte store and its
//! lazy-expiry map, codecs, store key derivation and metrics.

mod codec;
mod entry;
mod expiry;
mod key;
mod stats;
mod store;


// Re-export public types
pub use codec::{Codec, JsonCodec};
pub use entry::{CacheEntry, DEFAULT_TTL_SECS};
pub use expiry::ExpiryMap;
pub use key::{fingerprint, marker_key, DefaultKeyHasher, KeyHasher, FINGERPRINT_LEN, MARKER_SUFFIX};
pub use stats::{CacheStats, FetchMetrics};
pub use store::{CacheStore, ExpiryStore};
