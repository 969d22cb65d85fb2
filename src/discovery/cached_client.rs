//! Cached discovery client that wraps a delegate with transparent caching.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::client::HttpDiscoveryClient;
use super::types::{ApiGroupList, ApiResourceList, OpenApiDocument, VersionInfo};
use super::{CachedDiscoveryInterface, DiscoveryInterface};
use crate::cache::{default_prefix, CacheBackend, CacheKey, MetadataCache};
use crate::config::Config;
use crate::error::{DiscoveryError, TransportError};
use crate::http::{ConditionalHttpCache, ReqwestTransport, SharedTransport, Transport};

/// Discovery client with transparent caching support.
///
/// This wraps a delegate and provides the same API. Group lists and
/// per-group-version resource lists are cached in the store; the aggregate
/// listings reuse those, and everything else passes straight through.
pub struct CachedDiscoveryClient<D> {
  delegate: D,
  /// Key prefix; must be unique per server
  prefix: String,
  cache: MetadataCache,
}

impl<D: DiscoveryInterface> CachedDiscoveryClient<D> {
  pub fn new(delegate: D, prefix: impl Into<String>, backend: CacheBackend, ttl: Duration) -> Self {
    Self {
      delegate,
      prefix: prefix.into(),
      cache: MetadataCache::new(backend, ttl),
    }
  }

  pub fn is_caching(&self) -> bool {
    self.cache.is_enabled()
  }
}

impl CachedDiscoveryClient<HttpDiscoveryClient> {
  /// Build a cached client for the configured server.
  ///
  /// The store is probed once. When it answers, it backs both the structured
  /// cache and an ETag-revalidating HTTP cache under the delegate; when it does
  /// not, the client is built anyway and passes every call through.
  pub async fn for_config(config: &Config) -> Result<Self, DiscoveryError> {
    let server = config.server_url()?;
    let backend = CacheBackend::connect(&config.store).await;

    let http = reqwest::Client::builder()
      .timeout(config.request_timeout())
      .build()
      .map_err(TransportError::from)?;
    let network = ReqwestTransport::new(http);

    let transport = layered_transport(&backend, network);

    let prefix = config
      .cache
      .prefix
      .clone()
      .unwrap_or_else(|| default_prefix(&server));
    debug!(
      server = %server,
      prefix = %prefix,
      backend = ?backend,
      "building cached discovery client"
    );

    let delegate = HttpDiscoveryClient::new(server, transport);
    Ok(Self::new(delegate, prefix, backend, config.cache.ttl()))
  }
}

/// Put the conditional HTTP cache in front of `network` when the store is up.
fn layered_transport<T>(backend: &CacheBackend, network: T) -> SharedTransport
where
  T: Transport + 'static,
{
  match backend.store() {
    Some(store) => Arc::new(ConditionalHttpCache::new(store.clone(), network)),
    None => Arc::new(network),
  }
}

#[async_trait]
impl<D: DiscoveryInterface> DiscoveryInterface for CachedDiscoveryClient<D> {
  async fn server_groups(&self) -> Result<ApiGroupList, DiscoveryError> {
    let key = CacheKey::groups(&self.prefix);

    let result = self
      .cache
      .fetch(&key, || self.delegate.server_groups())
      .await?;
    debug!(key = %key, source = ?result.source, "server groups");

    Ok(result.data)
  }

  async fn server_resources_for_group_version(
    &self,
    group_version: &str,
  ) -> Result<ApiResourceList, DiscoveryError> {
    let key = CacheKey::resources(&self.prefix, group_version);

    let result = self
      .cache
      .fetch(&key, || {
        self
          .delegate
          .server_resources_for_group_version(group_version)
      })
      .await?;
    debug!(key = %key, source = ?result.source, "server resources");

    Ok(result.data)
  }

  /// Server version (not cached).
  async fn server_version(&self) -> Result<VersionInfo, DiscoveryError> {
    self.delegate.server_version().await
  }

  /// OpenAPI document (not cached at this layer; the HTTP cache still applies).
  async fn openapi_schema(&self) -> Result<OpenApiDocument, DiscoveryError> {
    self.delegate.openapi_schema().await
  }

  fn transport(&self) -> SharedTransport {
    self.delegate.transport()
  }
}

impl<D: DiscoveryInterface> CachedDiscoveryInterface for CachedDiscoveryClient<D> {
  fn fresh(&self) -> bool {
    self.cache.is_fresh()
  }

  fn invalidate(&self) {
    self.cache.invalidate();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::discovery::{ApiGroup, GroupVersionForDiscovery};
  use crate::http::X_FROM_CACHE;
  use crate::testing::{
    resource, resource_list, FailingStore, MemoryStore, MockDiscovery, MockTransport,
  };
  use reqwest::{Method, Request};
  use url::Url;

  const TTL: Duration = Duration::from_secs(600);

  fn cached(
    mock: &Arc<MockDiscovery>,
    store: &Arc<MemoryStore>,
  ) -> CachedDiscoveryClient<Arc<MockDiscovery>> {
    CachedDiscoveryClient::new(
      mock.clone(),
      "svc1",
      CacheBackend::Enabled(store.clone()),
      TTL,
    )
  }

  fn ab() -> ApiResourceList {
    resource_list("v1", vec![resource("a", true), resource("b", false)])
  }

  #[tokio::test]
  async fn test_read_through_then_hit_then_invalidate() {
    let mock = Arc::new(MockDiscovery::default());
    mock.set_resources(ab());
    let store = Arc::new(MemoryStore::default());
    let client = cached(&mock, &store);

    let first = client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(first, ab());
    assert_eq!(mock.resource_calls("v1"), 1);
    assert_eq!(
      store.value("svc1/v1/resources"),
      Some(serde_json::to_vec(&ab()).unwrap())
    );

    let second = client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(second, ab());
    assert_eq!(mock.resource_calls("v1"), 1);

    client.invalidate();
    assert!(store.contains("svc1/v1/resources"));

    let third = client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(third, ab());
    assert_eq!(mock.resource_calls("v1"), 2);
    assert!(client.fresh());
  }

  #[tokio::test]
  async fn test_empty_results_are_never_cached() {
    let mock = Arc::new(MockDiscovery::default());
    mock.set_resources(resource_list("v1", Vec::new()));
    let store = Arc::new(MemoryStore::default());
    let client = cached(&mock, &store);

    let empty = client.server_resources_for_group_version("v1").await.unwrap();
    assert!(empty.resources.is_empty());
    assert!(!store.contains("svc1/v1/resources"));

    client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(mock.resource_calls("v1"), 2);
  }

  #[tokio::test]
  async fn test_entries_from_another_process_are_used_but_not_fresh() {
    let mock = Arc::new(MockDiscovery::default());
    let store = Arc::new(MemoryStore::default());
    store.insert("svc1/v1/resources", &serde_json::to_vec(&ab()).unwrap());
    let client = cached(&mock, &store);

    assert!(client.fresh());
    let served = client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(served, ab());
    assert_eq!(mock.resource_calls("v1"), 0);
    assert!(!client.fresh());

    // After invalidation the foreign entry is ignored
    client.invalidate();
    assert!(client.fresh());
    mock.set_resources(ab());
    client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(mock.resource_calls("v1"), 1);
    assert!(client.fresh());
  }

  #[tokio::test]
  async fn test_undecodable_entry_falls_back_to_delegate() {
    let mock = Arc::new(MockDiscovery::default());
    mock.set_resources(ab());
    let store = Arc::new(MemoryStore::default());
    store.insert("svc1/v1/resources", b"\x00\x01 written by an older client");
    let client = cached(&mock, &store);

    let served = client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(served, ab());
    assert_eq!(mock.resource_calls("v1"), 1);
  }

  #[tokio::test]
  async fn test_delegate_errors_propagate() {
    let mock = Arc::new(MockDiscovery::default());
    mock.fail_resources("v1", 503);
    let store = Arc::new(MemoryStore::default());
    let client = cached(&mock, &store);

    let err = client.server_resources_for_group_version("v1").await.unwrap_err();
    match err {
      DiscoveryError::Status { status, url, .. } => {
        assert_eq!(status, 503);
        assert_eq!(url, "mock://v1");
      }
      other => panic!("unexpected error: {other}"),
    }
    assert!(store.keys().is_empty());
  }

  #[tokio::test]
  async fn test_store_write_failure_still_returns_live_data() {
    let mock = Arc::new(MockDiscovery::default());
    mock.set_resources(ab());
    let client = CachedDiscoveryClient::new(
      mock.clone(),
      "svc1",
      CacheBackend::Enabled(Arc::new(FailingStore)),
      TTL,
    );

    assert_eq!(client.server_resources_for_group_version("v1").await.unwrap(), ab());
    assert_eq!(client.server_resources_for_group_version("v1").await.unwrap(), ab());
    assert_eq!(mock.resource_calls("v1"), 2);
  }

  #[tokio::test]
  async fn test_disabled_backend_passes_through() {
    let mock = Arc::new(MockDiscovery::default());
    mock.set_resources(ab());
    let client = CachedDiscoveryClient::new(mock.clone(), "svc1", CacheBackend::Disabled, TTL);

    assert!(!client.is_caching());
    client.server_resources_for_group_version("v1").await.unwrap();
    client.server_resources_for_group_version("v1").await.unwrap();
    assert_eq!(mock.resource_calls("v1"), 2);
  }

  #[tokio::test]
  async fn test_groups_are_cached_under_groups_key() {
    let mock = Arc::new(MockDiscovery::default());
    mock.set_groups(vec![ApiGroup {
      name: "apps".to_string(),
      versions: vec![GroupVersionForDiscovery::new("apps", "v1")],
      preferred_version: None,
    }]);
    let store = Arc::new(MemoryStore::default());
    let client = cached(&mock, &store);

    client.server_groups().await.unwrap();
    client.server_groups().await.unwrap();

    assert!(store.contains("svc1/groups"));
    assert_eq!(mock.group_calls(), 1);
  }

  #[tokio::test]
  async fn test_aggregates_reuse_cached_entries() {
    let mock = Arc::new(MockDiscovery::default());
    mock.set_groups(vec![ApiGroup {
      name: String::new(),
      versions: vec![GroupVersionForDiscovery::new("", "v1")],
      preferred_version: Some(GroupVersionForDiscovery::new("", "v1")),
    }]);
    mock.set_resources(ab());
    let store = Arc::new(MemoryStore::default());
    let client = cached(&mock, &store);

    client.server_groups_and_resources().await.unwrap();
    let preferred = client.server_preferred_resources().await.unwrap();

    assert!(preferred.is_complete());
    assert_eq!(preferred.value[0].resources.len(), 2);
    assert_eq!(mock.group_calls(), 1);
    assert_eq!(mock.resource_calls("v1"), 1);
  }

  #[tokio::test]
  async fn test_pass_through_calls_are_not_cached() {
    let mock = Arc::new(MockDiscovery::default());
    let store = Arc::new(MemoryStore::default());
    let client = cached(&mock, &store);

    let version = client.server_version().await.unwrap();
    assert_eq!(version.git_version, "v1.31.0");
    client.server_version().await.unwrap();

    assert!(store.keys().is_empty());
    assert_eq!(mock.version_calls(), 2);
  }

  fn etag_then_not_modified() -> MockTransport {
    let ok = http::Response::builder()
      .status(200)
      .header("etag", "\"7\"")
      .body(b"{\"kind\":\"APIVersions\"}".to_vec())
      .unwrap();
    let unchanged = http::Response::builder().status(304).body(Vec::new()).unwrap();
    MockTransport::new(vec![ok, unchanged])
  }

  fn get_api() -> Request {
    Request::new(Method::GET, Url::parse("https://srv/api").unwrap())
  }

  #[tokio::test]
  async fn test_enabled_backend_installs_http_cache() {
    let store = Arc::new(MemoryStore::default());
    let backend = CacheBackend::Enabled(store.clone());
    let transport = layered_transport(&backend, etag_then_not_modified());

    transport.round_trip(get_api()).await.unwrap();
    let keys = store.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("httpcache:"));

    let revalidated = transport.round_trip(get_api()).await.unwrap();
    assert_eq!(revalidated.status(), 200);
    assert!(revalidated.headers().get(X_FROM_CACHE).is_some());
  }

  #[tokio::test]
  async fn test_disabled_backend_uses_plain_transport() {
    let transport = layered_transport(&CacheBackend::Disabled, etag_then_not_modified());

    assert_eq!(transport.round_trip(get_api()).await.unwrap().status(), 200);
    let second = transport.round_trip(get_api()).await.unwrap();
    assert_eq!(second.status(), 304);
    assert!(second.headers().get(X_FROM_CACHE).is_none());
  }
}
