//! Error types shared across the cache, transport and discovery layers.

use std::collections::BTreeMap;

/// Failure talking to the backing key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("redis: {0}")]
  Redis(#[from] redis::RedisError),
  #[error("store connection timed out after {0:?}")]
  Timeout(std::time::Duration),
  #[error("invalid store address {address}: {reason}")]
  InvalidAddress { address: String, reason: String },
}

/// Why the structured cache could not serve a key.
///
/// None of these are fatal. Every variant sends the caller to the delegate.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("cache miss")]
  Miss,
  #[error("cache invalidated")]
  Invalidated,
  #[error("cache store unavailable: {0}")]
  StoreUnavailable(#[from] StoreError),
}

/// Failure in an HTTP round trip.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
  #[error(transparent)]
  Request(#[from] reqwest::Error),
  #[error("failed to build response: {0}")]
  Http(#[from] http::Error),
  #[error("request to {0} was cancelled")]
  Cancelled(String),
}

/// Failure returned by a discovery client.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
  #[error(transparent)]
  Transport(#[from] TransportError),
  #[error("the server returned {status} for {url}: {body}")]
  Status {
    url: String,
    status: u16,
    body: String,
  },
  #[error("failed to decode response from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("invalid server url: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("unable to retrieve the complete list of server APIs: {}", format_groups(.groups))]
  GroupDiscoveryFailed { groups: BTreeMap<String, String> },
  #[error("{0}")]
  Unavailable(String),
}

fn format_groups(groups: &BTreeMap<String, String>) -> String {
  groups
    .iter()
    .map(|(gv, err)| format!("{}: {}", gv, err))
    .collect::<Vec<_>>()
    .join(", ")
}
