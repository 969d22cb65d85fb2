//! Aggregate listings built from the per-group-version fetches.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};

use super::types::{ApiGroup, ApiResource, ApiResourceList};
use super::DiscoveryInterface;
use crate::error::DiscoveryError;

/// A result that may be missing some group-versions.
///
/// Discovery keeps going when one group-version fails, so a single broken
/// aggregated API does not hide every other group.
#[derive(Debug)]
pub struct PartialDiscovery<T> {
  pub value: T,
  /// Group-versions that could not be fetched, with the reason
  pub failed: BTreeMap<String, DiscoveryError>,
}

impl<T> PartialDiscovery<T> {
  pub fn is_complete(&self) -> bool {
    self.failed.is_empty()
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PartialDiscovery<U> {
    PartialDiscovery {
      value: f(self.value),
      failed: self.failed,
    }
  }

  /// The value, or `GroupDiscoveryFailed` if any group-version failed.
  pub fn into_result(self) -> Result<T, DiscoveryError> {
    if self.failed.is_empty() {
      return Ok(self.value);
    }
    Err(DiscoveryError::GroupDiscoveryFailed {
      groups: self
        .failed
        .into_iter()
        .map(|(gv, e)| (gv, e.to_string()))
        .collect(),
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupsAndResources {
  pub groups: Vec<ApiGroup>,
  pub resources: Vec<ApiResourceList>,
}

type Fetched = (
  BTreeMap<String, ApiResourceList>,
  BTreeMap<String, DiscoveryError>,
);

/// Fetch every group-version concurrently, splitting successes from failures.
async fn fetch_group_version_resources<D>(d: &D, groups: &[ApiGroup]) -> Fetched
where
  D: DiscoveryInterface + ?Sized,
{
  let group_versions = groups
    .iter()
    .flat_map(|group| group.versions.iter())
    .map(|version| version.group_version.as_str());

  let results = join_all(group_versions.map(|gv| async move {
    (gv.to_string(), d.server_resources_for_group_version(gv).await)
  }))
  .await;

  let mut lists = BTreeMap::new();
  let mut failed = BTreeMap::new();
  for (gv, result) in results {
    match result {
      Ok(list) => {
        lists.insert(gv, list);
      }
      Err(e) => {
        failed.insert(gv, e);
      }
    }
  }
  (lists, failed)
}

pub(super) async fn server_groups_and_resources<D>(
  d: &D,
) -> Result<PartialDiscovery<GroupsAndResources>, DiscoveryError>
where
  D: DiscoveryInterface + ?Sized,
{
  let groups = d.server_groups().await?.groups;
  let (mut lists, failed) = fetch_group_version_resources(d, &groups).await;

  // Keep server order: groups first, then versions within a group
  let resources = groups
    .iter()
    .flat_map(|group| group.versions.iter())
    .filter_map(|version| lists.remove(&version.group_version))
    .collect();

  Ok(PartialDiscovery {
    value: GroupsAndResources { groups, resources },
    failed,
  })
}

pub(super) async fn server_preferred_resources<D>(
  d: &D,
) -> Result<PartialDiscovery<Vec<ApiResourceList>>, DiscoveryError>
where
  D: DiscoveryInterface + ?Sized,
{
  let groups = d.server_groups().await?.groups;
  let (lists, failed) = fetch_group_version_resources(d, &groups).await;

  Ok(PartialDiscovery {
    value: select_preferred(&groups, &lists),
    failed,
  })
}

/// Pick one version of each (group, resource).
///
/// The preferred version wins; otherwise the first version listing the
/// resource does. Subresources are left out, as are group-versions that end
/// up with nothing.
fn select_preferred(
  groups: &[ApiGroup],
  lists: &BTreeMap<String, ApiResourceList>,
) -> Vec<ApiResourceList> {
  let mut result: Vec<ApiResourceList> = Vec::new();
  let mut slots: HashMap<&str, usize> = HashMap::new();
  let mut chosen: HashMap<(&str, &str), (&str, &ApiResource)> = HashMap::new();
  let mut order: Vec<(&str, &str)> = Vec::new();

  for group in groups {
    let preferred = group.preferred_version.as_ref().map(|p| p.version.as_str());

    for version in &group.versions {
      let Some(list) = lists.get(&version.group_version) else {
        continue;
      };

      slots.insert(version.group_version.as_str(), result.len());
      result.push(ApiResourceList {
        group_version: version.group_version.clone(),
        resources: Vec::new(),
      });

      for resource in list.resources.iter().filter(|r| !r.is_subresource()) {
        let key = (group.name.as_str(), resource.name.as_str());
        let is_preferred = preferred == Some(version.version.as_str());
        if chosen.contains_key(&key) && !is_preferred {
          continue;
        }
        if !chosen.contains_key(&key) {
          order.push(key);
        }
        chosen.insert(key, (version.group_version.as_str(), resource));
      }
    }
  }

  for key in order {
    let (gv, resource) = chosen[&key];
    result[slots[gv]].resources.push(resource.clone());
  }

  result.retain(|list| !list.resources.is_empty());
  result
}

pub(super) fn namespaced_only(lists: Vec<ApiResourceList>) -> Vec<ApiResourceList> {
  lists
    .into_iter()
    .map(|mut list| {
      list.resources.retain(|r| r.namespaced);
      list
    })
    .filter(|list| !list.resources.is_empty())
    .collect()
}
