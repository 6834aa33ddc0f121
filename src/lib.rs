//! SPARQL Cache Proxy - a caching reverse proxy for SPARQL endpoints
//!
//! This service sits in front of a triplestore, forwards SPARQL queries to it
//! and serves repeated queries from a shared Redis cache keyed by query
//! content and negotiated response format.

pub mod application;
pub mod config;
pub mod error;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
