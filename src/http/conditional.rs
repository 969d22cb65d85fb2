//! Byte-level HTTP cache with ETag revalidation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{
  HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, ETAG,
  IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RANGE, TE, TRANSFER_ENCODING, UPGRADE,
};
use http::StatusCode;
use reqwest::{Method, Request, Response};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error};

use super::transport::{request_key, CancelRequest, Transport};
use crate::cache::SharedStore;
use crate::error::TransportError;

/// How long stored responses live in the store.
pub const HTTP_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Headers a 304 must not overwrite in the stored response.
fn is_hop_by_hop(name: &HeaderName) -> bool {
  [CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING, TE, UPGRADE].contains(name)
}

/// Header marking a response served from stored bytes.
pub const X_FROM_CACHE: &str = "x-from-cache";

/// Storage adapter for raw responses.
///
/// Keys live under `httpcache:` so they never collide with structured cache
/// entries in a shared store. Failures are logged and swallowed.
#[derive(Clone)]
pub struct HttpCacheStorage {
  store: SharedStore,
}

impl HttpCacheStorage {
  pub fn new(store: SharedStore) -> Self {
    Self { store }
  }

  fn storage_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("httpcache:{}", hex::encode(hasher.finalize()))
  }

  pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
    match self.store.get(&Self::storage_key(key)).await {
      Ok(value) => value,
      Err(e) => {
        debug!(key, error = %e, "http cache read failed");
        None
      }
    }
  }

  pub async fn set(&self, key: &str, response: &[u8]) {
    if let Err(e) = self
      .store
      .set(&Self::storage_key(key), response, HTTP_CACHE_TTL)
      .await
    {
      debug!(key, error = %e, "http cache write failed");
    }
  }

  pub async fn delete(&self, key: &str) {
    if let Err(e) = self.store.delete(&Self::storage_key(key)).await {
      debug!(key, error = %e, "http cache delete failed");
    }
  }
}

/// A stored response: status line, headers and body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResponse {
  status: u16,
  headers: Vec<(String, Vec<u8>)>,
  body: Vec<u8>,
  stored_at: DateTime<Utc>,
}

impl CachedResponse {
  fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name.as_str()))
      .and_then(|(_, v)| HeaderValue::from_bytes(v).ok())
  }

  fn header_map(&self) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in &self.headers {
      if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_bytes(value),
      ) {
        map.append(name, value);
      }
    }
    map
  }

  fn set_headers(&mut self, headers: &HeaderMap) {
    self.headers = headers
      .iter()
      .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
      .collect();
  }

  /// Replace stored headers with the end-to-end ones a 304 carried.
  fn merge_headers(&mut self, fresh: &HeaderMap) {
    let mut headers = self.header_map();
    for name in fresh.keys().filter(|name| !is_hop_by_hop(name)) {
      headers.remove(name);
      for value in fresh.get_all(name) {
        headers.append(name.clone(), value.clone());
      }
    }
    self.set_headers(&headers);
  }

  fn into_response(self, from_cache: bool) -> Result<Response, TransportError> {
    let mut builder = http::Response::builder().status(self.status);
    if let Some(headers) = builder.headers_mut() {
      *headers = self.header_map();
      if from_cache {
        headers.insert(X_FROM_CACHE, HeaderValue::from_static("1"));
      }
    }
    Ok(Response::from(builder.body(self.body)?))
  }
}

fn is_cacheable(request: &Request) -> bool {
  (*request.method() == Method::GET || *request.method() == Method::HEAD)
    && !request.headers().contains_key(RANGE)
}

fn has_no_store(headers: &HeaderMap) -> bool {
  headers.get_all(CACHE_CONTROL).iter().any(|value| {
    value
      .to_str()
      .map(|v| {
        v.split(',')
          .any(|directive| directive.trim().eq_ignore_ascii_case("no-store"))
      })
      .unwrap_or(false)
  })
}

/// Transport that stores successful responses and revalidates them with
/// `If-None-Match` / `If-Modified-Since`, answering a 304 with the stored body.
pub struct ConditionalHttpCache<T> {
  storage: HttpCacheStorage,
  inner: T,
}

impl<T: Transport> ConditionalHttpCache<T> {
  pub fn new(store: SharedStore, inner: T) -> Self {
    Self {
      storage: HttpCacheStorage::new(store),
      inner,
    }
  }

  /// The transport requests are forwarded to.
  pub fn wrapped(&self) -> &T {
    &self.inner
  }

  async fn load(&self, key: &str) -> Option<CachedResponse> {
    let bytes = self.storage.get(key).await?;
    match serde_json::from_slice(&bytes) {
      Ok(cached) => Some(cached),
      Err(e) => {
        debug!(key, error = %e, "dropping undecodable http cache entry");
        self.storage.delete(key).await;
        None
      }
    }
  }

  async fn save(&self, key: &str, cached: &CachedResponse) {
    match serde_json::to_vec(cached) {
      Ok(bytes) => self.storage.set(key, &bytes).await,
      Err(e) => debug!(key, error = %e, "failed to encode http cache entry"),
    }
  }
}

#[async_trait]
impl<T: Transport> Transport for ConditionalHttpCache<T> {
  async fn round_trip(&self, mut request: Request) -> Result<Response, TransportError> {
    let key = request_key(&request);

    if !is_cacheable(&request) {
      self.storage.delete(&key).await;
      return self.inner.round_trip(request).await;
    }

    let cached = self.load(&key).await;
    if let Some(cached) = &cached {
      if let Some(etag) = cached.header(&ETAG) {
        request.headers_mut().insert(IF_NONE_MATCH, etag);
      }
      if let Some(modified) = cached.header(&LAST_MODIFIED) {
        request.headers_mut().insert(IF_MODIFIED_SINCE, modified);
      }
    }
    let no_store = has_no_store(request.headers());

    let response = self.inner.round_trip(request).await?;

    if response.status() == StatusCode::NOT_MODIFIED {
      if let Some(mut cached) = cached {
        debug!(
          key = %key,
          age_secs = (Utc::now() - cached.stored_at).num_seconds(),
          "revalidated cached response"
        );
        cached.merge_headers(response.headers());
        cached.stored_at = Utc::now();
        self.save(&key, &cached).await;
        return cached.into_response(true);
      }
      return Ok(response);
    }

    if response.status() != StatusCode::OK {
      if cached.is_some() {
        self.storage.delete(&key).await;
      }
      return Ok(response);
    }

    if no_store || has_no_store(response.headers()) {
      self.storage.delete(&key).await;
      return Ok(response);
    }

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    let mut entry = CachedResponse {
      status,
      headers: Vec::new(),
      body,
      stored_at: Utc::now(),
    };
    entry.set_headers(&headers);
    self.save(&key, &entry).await;

    entry.into_response(false)
  }

  fn canceler(&self) -> Option<&dyn CancelRequest> {
    Some(self)
  }
}

impl<T: Transport> CancelRequest for ConditionalHttpCache<T> {
  fn cancel_request(&self, request: &Request) {
    match self.inner.canceler() {
      Some(canceler) => canceler.cancel_request(request),
      None => error!(
        "cancel_request not implemented by {}",
        std::any::type_name::<T>()
      ),
    }
  }
}
