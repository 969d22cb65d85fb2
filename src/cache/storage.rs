//! Key-value store trait and the Redis implementation.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Minimal interface over an external key-value store.
///
/// Expiry is owned by the store: `set` hands the TTL over and `get` returns
/// `None` once it has passed.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
  /// Fetch the bytes stored under `key`, or `None` on a miss.
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  /// Store `value` under `key`, expiring after `ttl`.
  async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

  /// Remove `key`. Removing an absent key is not an error.
  async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn KeyValueCache>;

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisStore {
  conn: ConnectionManager,
}

impl RedisStore {
  /// Connect to Redis and verify the connection with a PING.
  pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
    let client = redis::Client::open(connection_url(config)?.as_str())?;
    let timeout = config.connect_timeout();

    let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
      .await
      .map_err(|_| StoreError::Timeout(timeout))??;

    let store = Self { conn };
    store.ping(timeout).await?;
    Ok(store)
  }

  async fn ping(&self, timeout: Duration) -> Result<(), StoreError> {
    let mut conn = self.conn.clone();
    let pong: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut conn))
      .await
      .map_err(|_| StoreError::Timeout(timeout))??;
    debug!(reply = %pong, "redis ping");
    Ok(())
  }
}

/// Build a `redis://` URL from the configured address, credentials and db.
fn connection_url(config: &StoreConfig) -> Result<Url, StoreError> {
  let invalid = |reason: String| StoreError::InvalidAddress {
    address: config.address.clone(),
    reason,
  };

  let mut url = Url::parse(&format!("redis://{}/{}", config.address, config.db))
    .map_err(|e| invalid(e.to_string()))?;

  if let Some(username) = &config.username {
    url
      .set_username(username)
      .map_err(|_| invalid("cannot carry a username".to_string()))?;
  }
  if let Some(password) = config.password() {
    url
      .set_password(Some(&password))
      .map_err(|_| invalid("cannot carry a password".to_string()))?;
  }

  Ok(url)
}

#[async_trait]
impl KeyValueCache for RedisStore {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let mut conn = self.conn.clone();
    let value: Option<Vec<u8>> = conn.get(key).await?;
    Ok(value)
  }

  async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
    let mut conn = self.conn.clone();
    // SETEX rejects a zero expiry
    let seconds = ttl.as_secs().max(1);
    let _: () = conn.set_ex(key, value, seconds).await?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let mut conn = self.conn.clone();
    let _: () = conn.del(key).await?;
    Ok(())
  }
}

/// Whether caching is active, decided once when the client is built.
#[derive(Clone)]
pub enum CacheBackend {
  /// Caching enabled against the attached store.
  Enabled(SharedStore),
  /// Store unreachable or not configured; everything passes through.
  Disabled,
}

impl CacheBackend {
  /// Connect to the configured store, falling back to `Disabled` when it
  /// cannot be reached. Never fails.
  pub async fn connect(config: &StoreConfig) -> Self {
    match RedisStore::connect(config).await {
      Ok(store) => Self::Enabled(Arc::new(store)),
      Err(e) => {
        warn!(address = %config.address, error = %e, "cache store unreachable, caching disabled");
        Self::Disabled
      }
    }
  }

  pub fn store(&self) -> Option<&SharedStore> {
    match self {
      Self::Enabled(store) => Some(store),
      Self::Disabled => None,
    }
  }

  pub fn is_enabled(&self) -> bool {
    matches!(self, Self::Enabled(_))
  }
}

impl std::fmt::Debug for CacheBackend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Enabled(_) => f.write_str("CacheBackend::Enabled"),
      Self::Disabled => f.write_str("CacheBackend::Disabled"),
    }
  }
}
