//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching engine.
///
/// Store and codec failures never reach callers of a fetcher: they are
/// absorbed as cache misses. Only computation failures and configuration
/// errors are returned.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The backing store failed to serve a request
    #[error("Store error: {0}")]
    Store(String),

    /// A value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(Arc<serde_json::Error>),

    /// Invalid construction parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The user supplied computation failed
    #[error("Computation failed: {0}")]
    Compute(Arc<anyhow::Error>),

    /// The computation task ended without producing a result (it panicked)
    #[error("Computation aborted before producing a result")]
    ComputeAborted,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec(Arc::new(err))
    }
}

impl From<anyhow::Error> for CacheError {
    fn from(err: anyhow::Error) -> Self {
        CacheError::Compute(Arc::new(err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
