//! HTTP transport abstraction and the reqwest-backed implementation.

use async_trait::async_trait;
use reqwest::{Client, Method, Request, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

use crate::error::TransportError;

/// A single HTTP round trip.
///
/// Transports compose: a cache wraps a network transport and is itself a
/// transport, so the discovery client never knows which one it holds.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn round_trip(&self, request: Request) -> Result<Response, TransportError>;

  /// Cancellation hook, when the transport supports one.
  fn canceler(&self) -> Option<&dyn CancelRequest> {
    None
  }
}

pub type SharedTransport = Arc<dyn Transport>;

/// Cancels in-flight requests.
pub trait CancelRequest: Send + Sync {
  /// Cancel every in-flight request with the same identity as `request`.
  fn cancel_request(&self, request: &Request);
}

/// Identity of a request: the URL for GET, `"{METHOD} {URL}"` otherwise.
pub fn request_key(request: &Request) -> String {
  if *request.method() == Method::GET {
    request.url().to_string()
  } else {
    format!("{} {}", request.method(), request.url())
  }
}

/// Transport that sends requests over the network with reqwest.
///
/// Each request runs on its own task so that `cancel_request` can abort it.
pub struct ReqwestTransport {
  client: Client,
  next_id: AtomicU64,
  in_flight: Mutex<HashMap<String, Vec<(u64, AbortHandle)>>>,
}

impl ReqwestTransport {
  pub fn new(client: Client) -> Self {
    Self {
      client,
      next_id: AtomicU64::new(0),
      in_flight: Mutex::new(HashMap::new()),
    }
  }

  fn in_flight(&self) -> MutexGuard<'_, HashMap<String, Vec<(u64, AbortHandle)>>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn untrack(&self, key: &str, id: u64) {
    let mut in_flight = self.in_flight();
    if let Some(handles) = in_flight.get_mut(key) {
      handles.retain(|(handle_id, _)| *handle_id != id);
      if handles.is_empty() {
        in_flight.remove(key);
      }
    }
  }
}

/// Untracks a request, and aborts it, once its caller is done with it.
///
/// Runs on completion and also when the caller's future is dropped mid-flight.
struct Tracked<'a> {
  transport: &'a ReqwestTransport,
  key: &'a str,
  id: u64,
  handle: AbortHandle,
}

impl Drop for Tracked<'_> {
  fn drop(&mut self) {
    self.handle.abort();
    self.transport.untrack(self.key, self.id);
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
    let key = request_key(&request);
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);

    let client = self.client.clone();
    let task = tokio::spawn(async move { client.execute(request).await });
    self
      .in_flight()
      .entry(key.clone())
      .or_default()
      .push((id, task.abort_handle()));
    let _tracked = Tracked {
      transport: self,
      key: &key,
      id,
      handle: task.abort_handle(),
    };

    match task.await {
      Ok(response) => Ok(response?),
      Err(_) => Err(TransportError::Cancelled(key.clone())),
    }
  }

  fn canceler(&self) -> Option<&dyn CancelRequest> {
    Some(self)
  }
}

impl CancelRequest for ReqwestTransport {
  fn cancel_request(&self, request: &Request) {
    let key = request_key(request);
    if let Some(handles) = self.in_flight().remove(&key) {
      for (_, handle) in handles {
        handle.abort();
      }
    }
  }
}
