//! Discovery documents as served by the API server.

use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

/// Versions served under the legacy `/api` root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiVersions {
  #[serde(default)]
  pub versions: Vec<String>,
}

/// All API groups the server exposes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiGroupList {
  #[serde(default)]
  pub groups: Vec<ApiGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGroup {
  /// Empty for the legacy core group
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub versions: Vec<GroupVersionForDiscovery>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub preferred_version: Option<GroupVersionForDiscovery>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionForDiscovery {
  /// `group/version`, or just `version` for the core group
  pub group_version: String,
  pub version: String,
}

impl GroupVersionForDiscovery {
  pub fn new(group: &str, version: &str) -> Self {
    Self {
      group_version: group_version(group, version),
      version: version.to_string(),
    }
  }
}

/// Format a group-version string; the core group has no `group/` part.
pub fn group_version(group: &str, version: &str) -> String {
  if group.is_empty() {
    version.to_string()
  } else {
    format!("{}/{}", group, version)
  }
}

/// Resources served under one group-version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResourceList {
  pub group_version: String,
  #[serde(default)]
  pub resources: Vec<ApiResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
  /// Plural name; subresources look like `pods/status`
  pub name: String,
  #[serde(default)]
  pub singular_name: String,
  #[serde(default)]
  pub namespaced: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub group: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default)]
  pub kind: String,
  #[serde(default)]
  pub verbs: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub short_names: Vec<String>,
}

impl ApiResource {
  pub fn is_subresource(&self) -> bool {
    self.name.contains('/')
  }
}

/// Server build information from `/version`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
  #[serde(default)]
  pub major: String,
  #[serde(default)]
  pub minor: String,
  #[serde(default)]
  pub git_version: String,
  #[serde(default)]
  pub git_commit: String,
  #[serde(default)]
  pub build_date: String,
  #[serde(default)]
  pub go_version: String,
  #[serde(default)]
  pub platform: String,
}

/// The server's OpenAPI document, kept as raw JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenApiDocument(pub serde_json::Value);

impl Cacheable for ApiGroupList {
  fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  fn entity_type() -> &'static str {
    "groups"
  }
}

impl Cacheable for ApiResourceList {
  fn is_empty(&self) -> bool {
    self.resources.is_empty()
  }

  fn entity_type() -> &'static str {
    "resources"
  }
}
