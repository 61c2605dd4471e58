//! Background Tasks Module
//!
//! Contains the worker pool that runs fire-and-forget jobs off the request path.
//!
//! # Tasks
//! - Cache writes: persisting freshly computed entries
//! - Refreshes: recomputing entries ahead of their expiry

mod pool;

pub use pool::TaskPool;
