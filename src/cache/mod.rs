//! Structured cache for discovery documents.
//!
//! This module provides a store-agnostic caching layer that:
//! - Serves discovery documents from a shared key-value store (Redis)
//! - Leaves expiry to the store's TTL
//! - Tracks which entries this process wrote, so invalidation can disown
//!   everything older without deleting anything
//! - Falls back to pass-through when the store is unreachable

mod key;
mod layer;
mod storage;
mod traits;

pub use key::{default_prefix, CacheKey};
pub use layer::MetadataCache;
pub use storage::{CacheBackend, KeyValueCache, RedisStore, SharedStore};
pub use traits::{CacheResult, CacheSource, Cacheable};
