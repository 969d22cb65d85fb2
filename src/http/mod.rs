//! HTTP transports, including the byte-level conditional cache.

mod conditional;
mod transport;

pub use conditional::{ConditionalHttpCache, HTTP_CACHE_TTL, X_FROM_CACHE};
pub use transport::{request_key, CancelRequest, ReqwestTransport, SharedTransport, Transport};
