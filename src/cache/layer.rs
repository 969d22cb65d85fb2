//! Cache layer that decides between the store and the delegate.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::storage::CacheBackend;
use super::traits::{CacheResult, Cacheable};
use crate::error::CacheError;

/// Ownership and freshness bookkeeping.
///
/// Only ever touched under `MetadataCache::state`, and never across an await.
#[derive(Debug)]
struct Ownership {
  /// Keys this instance wrote since the last invalidation
  owned: HashSet<CacheKey>,
  /// Set by `invalidate`; unowned entries are ignored while it holds
  invalidated: bool,
  /// True while every entry served since the last invalidation was owned
  fresh: bool,
  /// Bumped by every invalidation
  generation: u64,
}

impl Ownership {
  fn new() -> Self {
    Self {
      owned: HashSet::new(),
      invalidated: false,
      fresh: true,
      generation: 0,
    }
  }

  /// Whether a read of `key` may go to the store, and whether we own it.
  fn admit(&self, key: &CacheKey) -> Result<bool, CacheError> {
    let owned = self.owned.contains(key);
    if self.invalidated && !owned {
      return Err(CacheError::Invalidated);
    }
    Ok(owned)
  }

  /// Serve a value just read from the store, judged by the state at hit time.
  fn record_hit(&mut self, key: &CacheKey) -> Result<(), CacheError> {
    let owned = self.admit(key)?;
    self.fresh = self.fresh && owned;
    Ok(())
  }

  /// Take ownership of `key`, unless an invalidation happened since
  /// `generation` was observed.
  fn claim(&mut self, key: CacheKey, generation: u64) -> bool {
    if self.generation != generation {
      return false;
    }
    self.owned.insert(key);
    true
  }

  fn reset(&mut self) {
    self.owned = HashSet::new();
    self.invalidated = true;
    self.fresh = true;
    self.generation += 1;
  }
}

/// Structured cache over a key-value store.
///
/// Entries expire through the store's TTL. Which entries are trusted after an
/// invalidation is tracked per process: only keys written by this instance
/// since then are served, so another process's stale write in a shared store
/// is never picked up.
pub struct MetadataCache {
  backend: CacheBackend,
  ttl: Duration,
  state: Mutex<Ownership>,
}

impl MetadataCache {
  pub fn new(backend: CacheBackend, ttl: Duration) -> Self {
    Self {
      backend,
      ttl,
      state: Mutex::new(Ownership::new()),
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.backend.is_enabled()
  }

  fn state(&self) -> MutexGuard<'_, Ownership> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read the raw bytes stored under `key`.
  ///
  /// Every error is a miss from the caller's point of view.
  pub async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
    self.state().admit(key)?;

    let store = self.backend.store().ok_or(CacheError::Miss)?;
    let bytes = match store.get(key.as_str()).await {
      Ok(Some(bytes)) => bytes,
      Ok(None) => return Err(CacheError::Miss),
      Err(e) => {
        debug!(key = %key, error = %e, "cache read failed");
        return Err(CacheError::Miss);
      }
    };

    self.state().record_hit(key)?;
    Ok(bytes)
  }

  /// Write `bytes` under `key` and claim ownership if the store accepted it.
  ///
  /// A write that straddles `invalidate` is stored but not claimed.
  pub async fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
    let Some(store) = self.backend.store() else {
      return Ok(());
    };

    let generation = self.state().generation;
    store.set(key.as_str(), bytes, self.ttl).await?;
    if !self.state().claim(key.clone(), generation) {
      debug!(key = %key, "invalidated during write, entry not owned");
    }
    Ok(())
  }

  /// Disown every earlier write. Nothing is deleted from the store.
  pub fn invalidate(&self) {
    self.state().reset();
  }

  /// False once an entry not written by this instance has been served.
  pub fn is_fresh(&self) -> bool {
    self.state().fresh
  }

  /// Serve `key` from the store, or fetch it with `fetcher` and write it back.
  ///
  /// 1. Read and decode the entry; a decode failure counts as a miss
  /// 2. On a miss, call the fetcher and return its error untouched
  /// 3. Empty results are returned but never written
  /// 4. Write failures are logged; the live result is returned regardless
  pub async fn fetch<T, E, F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<CacheResult<T>, E>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    match self.read(key).await {
      Ok(bytes) => match T::decode(&bytes) {
        Ok(cached) => {
          debug!(key = %key, "returning cached {}", T::entity_type());
          return Ok(CacheResult::from_cache(cached));
        }
        Err(e) => debug!(key = %key, error = %e, "ignoring undecodable cache entry"),
      },
      Err(e) => debug!(key = %key, reason = %e, "cache not used"),
    }

    let live = fetcher().await?;

    if live.is_empty() {
      debug!(key = %key, "skipped caching, no {} found", T::entity_type());
      return Ok(CacheResult::from_network(live));
    }

    match live.encode() {
      Ok(bytes) => {
        if let Err(e) = self.write(key, &bytes).await {
          warn!(key = %key, error = %e, "failed to write cache");
        }
      }
      Err(e) => warn!(key = %key, error = %e, "failed to encode {}", T::entity_type()),
    }

    Ok(CacheResult::from_network(live))
  }
}

impl std::fmt::Debug for MetadataCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MetadataCache")
      .field("backend", &self.backend)
      .field("ttl", &self.ttl)
      .finish_non_exhaustive()
  }
}
