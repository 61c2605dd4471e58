//! Codec Module
//!
//! Converts cache entries to and from the bytes a [`CacheStore`](crate::cache::CacheStore) holds.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

// == Codec Trait ==
/// Encodes values of type `T` to bytes and back.
///
/// Fetchers absorb decode failures as cache misses, so a codec may reject
/// any input it does not recognise.
pub trait Codec<T>: Send + Sync + 'static {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

// == JSON Codec ==
/// [`Codec`] for any serde type, using `serde_json`.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::error::CacheError;

    #[test]
    fn test_entry_roundtrip() {
        let codec = JsonCodec::<CacheEntry<Vec<String>>>::new();
        let entry = CacheEntry::of(vec!["a".to_string(), "b".to_string()], 42);

        let bytes = codec.encode(&entry).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(decoded.result, entry.result);
        assert_eq!(decoded.ttl, 42);
    }

    #[test]
    fn test_empty_entry_roundtrip() {
        let codec = JsonCodec::<CacheEntry<u64>>::new();
        let entry = CacheEntry::empty(5);

        let decoded = codec.decode(&codec.encode(&entry).unwrap()).unwrap();
        assert_eq!(decoded.result, None);
        assert_eq!(decoded.ttl, 5);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = JsonCodec::<CacheEntry<u64>>::new();
        let result = codec.decode(b"\x00\x01garbage");
        assert!(matches!(result, Err(CacheError::Codec(_))));
    }
}
