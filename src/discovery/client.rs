use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::types::{
  ApiGroup, ApiGroupList, ApiResourceList, ApiVersions, GroupVersionForDiscovery,
  OpenApiDocument, VersionInfo,
};
use super::DiscoveryInterface;
use crate::error::{DiscoveryError, TransportError};
use crate::http::SharedTransport;

/// Discovery client that talks to the server over HTTP.
///
/// Every call is a plain JSON GET through the configured transport, so any
/// caching happens in the transport rather than here.
#[derive(Clone)]
pub struct HttpDiscoveryClient {
  base: Url,
  transport: SharedTransport,
}

impl HttpDiscoveryClient {
  pub fn new(mut base: Url, transport: SharedTransport) -> Self {
    // Url::join replaces the last segment unless the path ends with '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    Self { base, transport }
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DiscoveryError> {
    let url = self.base.join(path)?;

    let mut request = Request::new(Method::GET, url.clone());
    request
      .headers_mut()
      .insert(ACCEPT, HeaderValue::from_static("application/json"));

    let response = self.transport.round_trip(request).await?;
    let status = response.status();
    let body = response.bytes().await.map_err(TransportError::from)?;

    if !status.is_success() {
      return Err(DiscoveryError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: String::from_utf8_lossy(&body).into_owned(),
      });
    }

    serde_json::from_slice(&body).map_err(|source| DiscoveryError::Decode {
      url: url.to_string(),
      source,
    })
  }

  /// Like `get_json`, but a 404 or 403 yields the default value.
  async fn get_json_optional<T: DeserializeOwned + Default>(
    &self,
    path: &str,
  ) -> Result<T, DiscoveryError> {
    match self.get_json(path).await {
      Err(DiscoveryError::Status { status, .. })
        if status == StatusCode::NOT_FOUND.as_u16() || status == StatusCode::FORBIDDEN.as_u16() =>
      {
        Ok(T::default())
      }
      other => other,
    }
  }
}

/// Path serving a group-version: core versions live under `/api`.
fn resources_path(group_version: &str) -> String {
  if group_version.contains('/') {
    format!("apis/{}", group_version)
  } else {
    format!("api/{}", group_version)
  }
}

/// The legacy `/api` versions, presented as the unnamed core group.
fn core_group(versions: ApiVersions) -> Option<ApiGroup> {
  let versions: Vec<_> = versions
    .versions
    .iter()
    .map(|v| GroupVersionForDiscovery::new("", v))
    .collect();

  let preferred_version = versions.first().cloned()?;
  Some(ApiGroup {
    name: String::new(),
    versions,
    preferred_version: Some(preferred_version),
  })
}

#[async_trait]
impl DiscoveryInterface for HttpDiscoveryClient {
  async fn server_groups(&self) -> Result<ApiGroupList, DiscoveryError> {
    let legacy: ApiVersions = self.get_json_optional("api").await?;
    let mut list: ApiGroupList = self.get_json_optional("apis").await?;

    if let Some(core) = core_group(legacy) {
      list.groups.insert(0, core);
    }
    Ok(list)
  }

  async fn server_resources_for_group_version(
    &self,
    group_version: &str,
  ) -> Result<ApiResourceList, DiscoveryError> {
    if group_version.is_empty() {
      return Err(DiscoveryError::Unavailable(
        "group version must not be empty".to_string(),
      ));
    }

    let mut list: ApiResourceList = self.get_json(&resources_path(group_version)).await?;
    if list.group_version.is_empty() {
      list.group_version = group_version.to_string();
    }
    Ok(list)
  }

  async fn server_version(&self) -> Result<VersionInfo, DiscoveryError> {
    self.get_json("version").await
  }

  async fn openapi_schema(&self) -> Result<OpenApiDocument, DiscoveryError> {
    self.get_json("openapi/v2").await
  }

  fn transport(&self) -> SharedTransport {
    self.transport.clone()
  }
}
