//! Core traits and types for the structured cache.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for discovery documents that can be cached.
///
/// Documents round-trip through JSON. A document that reports itself empty is
/// never written, so a server that is still starting up cannot pin an empty
/// answer into the cache.
pub trait Cacheable: Send + Sync + Serialize + DeserializeOwned {
  /// True when the document lists nothing.
  fn is_empty(&self) -> bool;

  /// Document type name, used in log lines (e.g., "groups", "resources")
  fn entity_type() -> &'static str;

  fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(self)
  }

  fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
    serde_json::from_slice(bytes)
  }
}

/// Result from a cache operation, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Data fetched live from the delegate.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Data decoded from a store entry.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Live data from the delegate
  Network,
  /// Data from the store
  Cache,
}
