//! Proxy module for handling SPARQL requests
//!
//! The request pipeline: query extraction, cache-aside lookup, upstream
//! dispatch with a competing deadline, response normalization, and bounded
//! body capture for cache storage.

pub mod cache;
pub mod cache_key;
pub mod capture;
pub mod normalize;
pub mod query;
pub mod service;
pub mod types;
pub mod upstream;


pub use service::SparqlProxyService;
pub use types::{CacheConfig, ProxyConfig, ProxyError, ProxyResult};
