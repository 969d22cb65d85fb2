//! Cache entry keys.

use std::fmt;

/// Key of a structured cache entry.
///
/// Keys are path-like: `{prefix}/{groupVersion}/resources` for resource lists
/// and `{prefix}/groups` for the group list. The prefix must be unique per
/// target server, otherwise two servers sharing one store read each other's
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  /// Key for the resources served under one group-version.
  pub fn resources(prefix: &str, group_version: &str) -> Self {
    Self(join(&[prefix, group_version, "resources"]))
  }

  /// Key for the server's group list.
  pub fn groups(prefix: &str) -> Self {
    Self(join(&[prefix, "groups"]))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Join segments with `/`, dropping empty segments and doubled separators.
fn join(segments: &[&str]) -> String {
  let leading = segments
    .first()
    .is_some_and(|first| first.starts_with('/'));

  let joined = segments
    .iter()
    .flat_map(|s| s.split('/'))
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("/");

  if leading {
    format!("/{}", joined)
  } else {
    joined
  }
}

/// Derive a cache prefix from a server URL (`discovery/{host}_{port}`).
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, so the prefix stays one
/// path segment below `discovery/`.
pub fn default_prefix(server: &url::Url) -> String {
  let host = server.host_str().unwrap_or("unknown");
  let authority = match server.port_or_known_default() {
    Some(port) => format!("{}_{}", host, port),
    None => host.to_string(),
  };

  let sanitized: String = authority
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
        c
      } else {
        '_'
      }
    })
    .collect();

  format!("discovery/{}", sanitized)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resources_key() {
    assert_eq!(CacheKey::resources("svc1", "v1").as_str(), "svc1/v1/resources");
    assert_eq!(
      CacheKey::resources("svc1/", "apps/v1").as_str(),
      "svc1/apps/v1/resources"
    );
  }

  #[test]
  fn test_groups_key() {
    assert_eq!(CacheKey::groups("svc1").as_str(), "svc1/groups");
    assert_eq!(CacheKey::groups("/var/cache").as_str(), "/var/cache/groups");
  }

  #[test]
  fn test_default_prefix_is_per_authority() {
    let a = url::Url::parse("https://10.0.0.1:6443").unwrap();
    let b = url::Url::parse("https://10.0.0.1:8443").unwrap();
    assert_eq!(default_prefix(&a), "discovery/10.0.0.1_6443");
    assert_ne!(default_prefix(&a), default_prefix(&b));
  }

  #[test]
  fn test_default_prefix_sanitizes_ipv6() {
    let url = url::Url::parse("https://[::1]:6443").unwrap();
    assert_eq!(default_prefix(&url), "discovery/___1__6443");
  }
}
