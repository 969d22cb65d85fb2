//! Caching for API discovery clients.
//!
//! Two caches share one Redis store under disjoint key namespaces:
//! - [`cache::MetadataCache`] holds decoded discovery documents and backs
//!   [`discovery::CachedDiscoveryClient`]
//! - [`http::ConditionalHttpCache`] holds raw responses and revalidates them
//!   with ETags underneath the delegate client

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use discovery::{CachedDiscoveryClient, CachedDiscoveryInterface, DiscoveryInterface};
pub use error::{CacheError, DiscoveryError, StoreError, TransportError};
