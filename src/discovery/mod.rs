//! Discovery clients: the contract, a plain HTTP client, and the cached client.

mod aggregate;
mod cached_client;
mod client;
mod types;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::DiscoveryError;
use crate::http::SharedTransport;

pub use aggregate::{GroupsAndResources, PartialDiscovery};
pub use cached_client::CachedDiscoveryClient;
pub use client::HttpDiscoveryClient;
pub use types::{
  group_version, ApiGroup, ApiGroupList, ApiResource, ApiResourceList, ApiVersions,
  GroupVersionForDiscovery, OpenApiDocument, VersionInfo,
};

/// Everything a client needs to learn which APIs a server serves.
///
/// Implementors provide the two fetches plus the pass-through calls; the
/// aggregate listings are built on top of `server_groups` and
/// `server_resources_for_group_version`, so a caching implementation gets
/// cached aggregates for free.
#[async_trait]
pub trait DiscoveryInterface: Send + Sync {
  /// Groups with their versions and preferred version.
  async fn server_groups(&self) -> Result<ApiGroupList, DiscoveryError>;

  /// Resources served under one group-version (e.g. `v1`, `apps/v1`).
  async fn server_resources_for_group_version(
    &self,
    group_version: &str,
  ) -> Result<ApiResourceList, DiscoveryError>;

  /// Groups plus the resources of every group-version.
  async fn server_groups_and_resources(
    &self,
  ) -> Result<PartialDiscovery<GroupsAndResources>, DiscoveryError> {
    aggregate::server_groups_and_resources(self).await
  }

  /// Resources in the version the server prefers for each group.
  async fn server_preferred_resources(
    &self,
  ) -> Result<PartialDiscovery<Vec<ApiResourceList>>, DiscoveryError> {
    aggregate::server_preferred_resources(self).await
  }

  /// Like `server_preferred_resources`, restricted to namespaced resources.
  async fn server_preferred_namespaced_resources(
    &self,
  ) -> Result<PartialDiscovery<Vec<ApiResourceList>>, DiscoveryError> {
    let preferred = self.server_preferred_resources().await?;
    Ok(preferred.map(aggregate::namespaced_only))
  }

  async fn server_version(&self) -> Result<VersionInfo, DiscoveryError>;

  async fn openapi_schema(&self) -> Result<OpenApiDocument, DiscoveryError>;

  /// The transport requests go through.
  fn transport(&self) -> SharedTransport;
}

#[async_trait]
impl<T: DiscoveryInterface + ?Sized> DiscoveryInterface for Arc<T> {
  async fn server_groups(&self) -> Result<ApiGroupList, DiscoveryError> {
    (**self).server_groups().await
  }

  async fn server_resources_for_group_version(
    &self,
    group_version: &str,
  ) -> Result<ApiResourceList, DiscoveryError> {
    (**self).server_resources_for_group_version(group_version).await
  }

  async fn server_groups_and_resources(
    &self,
  ) -> Result<PartialDiscovery<GroupsAndResources>, DiscoveryError> {
    (**self).server_groups_and_resources().await
  }

  async fn server_preferred_resources(
    &self,
  ) -> Result<PartialDiscovery<Vec<ApiResourceList>>, DiscoveryError> {
    (**self).server_preferred_resources().await
  }

  async fn server_preferred_namespaced_resources(
    &self,
  ) -> Result<PartialDiscovery<Vec<ApiResourceList>>, DiscoveryError> {
    (**self).server_preferred_namespaced_resources().await
  }

  async fn server_version(&self) -> Result<VersionInfo, DiscoveryError> {
    (**self).server_version().await
  }

  async fn openapi_schema(&self) -> Result<OpenApiDocument, DiscoveryError> {
    (**self).openapi_schema().await
  }

  fn transport(&self) -> SharedTransport {
    (**self).transport()
  }
}

/// A discovery client that caches, and can be told to stop trusting its cache.
pub trait CachedDiscoveryInterface: DiscoveryInterface {
  /// True when every cached answer since the last invalidation was written by
  /// this client. When false, callers that miss something should invalidate
  /// and retry rather than assume the server lacks it.
  fn fresh(&self) -> bool;

  /// Stop trusting anything cached before now.
  fn invalidate(&self);
}
