//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Request, Response};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cache::KeyValueCache;
use crate::discovery::{
  ApiGroup, ApiGroupList, ApiResource, ApiResourceList, DiscoveryInterface, OpenApiDocument,
  VersionInfo,
};
use crate::error::{DiscoveryError, StoreError, TransportError};
use crate::http::{CancelRequest, SharedTransport, Transport};

/// In-memory store honouring TTLs.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, (Vec<u8>, Option<Instant>)>>,
}

impl MemoryStore {
  /// Insert without expiry, as another process sharing the store would.
  pub fn insert(&self, key: &str, value: &[u8]) {
    self
      .entries
      .lock()
      .unwrap()
      .insert(key.to_string(), (value.to_vec(), None));
  }

  pub fn value(&self, key: &str) -> Option<Vec<u8>> {
    self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone())
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.lock().unwrap().contains_key(key)
  }

  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<_> = self.entries.lock().unwrap().keys().cloned().collect();
    keys.sort();
    keys
  }
}

#[async_trait]
impl KeyValueCache for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let mut entries = self.entries.lock().unwrap();
    let expired = matches!(
      entries.get(key),
      Some((_, Some(deadline))) if *deadline <= Instant::now()
    );
    if expired {
      entries.remove(key);
      return Ok(None);
    }
    Ok(entries.get(key).map(|(value, _)| value.clone()))
  }

  async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
    self
      .entries
      .lock()
      .unwrap()
      .insert(key.to_string(), (value.to_vec(), Some(Instant::now() + ttl)));
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.entries.lock().unwrap().remove(key);
    Ok(())
  }
}

/// Store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl KeyValueCache for FailingStore {
  async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    Err(StoreError::Timeout(Duration::from_millis(1)))
  }

  async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
    Err(StoreError::Timeout(Duration::from_millis(1)))
  }

  async fn delete(&self, _key: &str) -> Result<(), StoreError> {
    Err(StoreError::Timeout(Duration::from_millis(1)))
  }
}

/// Transport replaying canned responses and recording what was sent.
pub struct MockTransport {
  responses: Mutex<VecDeque<http::Response<Vec<u8>>>>,
  sent: Mutex<Vec<(String, HeaderMap)>>,
  cancelled: Option<Mutex<Vec<String>>>,
}

impl MockTransport {
  pub fn new(responses: Vec<http::Response<Vec<u8>>>) -> Self {
    Self {
      responses: Mutex::new(responses.into()),
      sent: Mutex::new(Vec::new()),
      cancelled: None,
    }
  }

  /// Also expose a cancellation hook that records cancelled URLs.
  pub fn cancellable(mut self) -> Self {
    self.cancelled = Some(Mutex::new(Vec::new()));
    self
  }

  pub fn requests(&self) -> Vec<HeaderMap> {
    self.sent.lock().unwrap().iter().map(|(_, h)| h.clone()).collect()
  }

  pub fn urls(&self) -> Vec<String> {
    self.sent.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
  }

  pub fn cancelled(&self) -> Vec<String> {
    self
      .cancelled
      .as_ref()
      .map(|c| c.lock().unwrap().clone())
      .unwrap_or_default()
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
    self
      .sent
      .lock()
      .unwrap()
      .push((request.url().to_string(), request.headers().clone()));

    let response = self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
      http::Response::builder()
        .status(500)
        .body(b"no canned response left".to_vec())
        .unwrap()
    });
    Ok(Response::from(response))
  }

  fn canceler(&self) -> Option<&dyn CancelRequest> {
    self.cancelled.as_ref().map(|_| self as &dyn CancelRequest)
  }
}

impl CancelRequest for MockTransport {
  fn cancel_request(&self, request: &Request) {
    if let Some(cancelled) = &self.cancelled {
      cancelled.lock().unwrap().push(request.url().to_string());
    }
  }
}

#[derive(Default)]
struct MockState {
  groups: Vec<ApiGroup>,
  group_error: Option<u16>,
  resources: HashMap<String, ApiResourceList>,
  resource_errors: HashMap<String, u16>,
  group_calls: usize,
  resource_calls: HashMap<String, usize>,
  version_calls: usize,
}

/// Delegate discovery client with scripted answers and call counters.
#[derive(Default)]
pub struct MockDiscovery {
  state: Mutex<MockState>,
}

impl MockDiscovery {
  pub fn set_groups(&self, groups: Vec<ApiGroup>) {
    self.state.lock().unwrap().groups = groups;
  }

  pub fn fail_groups(&self, status: u16) {
    self.state.lock().unwrap().group_error = Some(status);
  }

  pub fn set_resources(&self, list: ApiResourceList) {
    let mut state = self.state.lock().unwrap();
    state.resource_errors.remove(&list.group_version);
    state.resources.insert(list.group_version.clone(), list);
  }

  pub fn fail_resources(&self, group_version: &str, status: u16) {
    self
      .state
      .lock()
      .unwrap()
      .resource_errors
      .insert(group_version.to_string(), status);
  }

  pub fn group_calls(&self) -> usize {
    self.state.lock().unwrap().group_calls
  }

  pub fn resource_calls(&self, group_version: &str) -> usize {
    self
      .state
      .lock()
      .unwrap()
      .resource_calls
      .get(group_version)
      .copied()
      .unwrap_or(0)
  }

  pub fn version_calls(&self) -> usize {
    self.state.lock().unwrap().version_calls
  }
}

fn mock_error(path: &str, status: u16) -> DiscoveryError {
  DiscoveryError::Status {
    url: format!("mock://{}", path),
    status,
    body: "mock failure".to_string(),
  }
}

#[async_trait]
impl DiscoveryInterface for MockDiscovery {
  async fn server_groups(&self) -> Result<ApiGroupList, DiscoveryError> {
    let mut state = self.state.lock().unwrap();
    state.group_calls += 1;
    if let Some(status) = state.group_error {
      return Err(mock_error("groups", status));
    }
    Ok(ApiGroupList {
      groups: state.groups.clone(),
    })
  }

  async fn server_resources_for_group_version(
    &self,
    group_version: &str,
  ) -> Result<ApiResourceList, DiscoveryError> {
    let mut state = self.state.lock().unwrap();
    *state
      .resource_calls
      .entry(group_version.to_string())
      .or_default() += 1;

    if let Some(status) = state.resource_errors.get(group_version) {
      return Err(mock_error(group_version, *status));
    }
    state
      .resources
      .get(group_version)
      .cloned()
      .ok_or_else(|| mock_error(group_version, 404))
  }

  async fn server_version(&self) -> Result<VersionInfo, DiscoveryError> {
    self.state.lock().unwrap().version_calls += 1;
    Ok(VersionInfo {
      major: "1".to_string(),
      minor: "31".to_string(),
      git_version: "v1.31.0".to_string(),
      ..VersionInfo::default()
    })
  }

  async fn openapi_schema(&self) -> Result<OpenApiDocument, DiscoveryError> {
    Ok(OpenApiDocument(serde_json::json!({ "swagger": "2.0" })))
  }

  fn transport(&self) -> SharedTransport {
    Arc::new(MockTransport::new(Vec::new()))
  }
}

pub fn resource(name: &str, namespaced: bool) -> ApiResource {
  ApiResource {
    name: name.to_string(),
    singular_name: name.trim_end_matches('s').to_string(),
    namespaced,
    kind: name.to_string(),
    verbs: vec!["get".to_string(), "list".to_string()],
    ..ApiResource::default()
  }
}

pub fn resource_list(group_version: &str, resources: Vec<ApiResource>) -> ApiResourceList {
  ApiResourceList {
    group_version: group_version.to_string(),
    resources,
  }
}
