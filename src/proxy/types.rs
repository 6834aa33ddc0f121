//! Type definitions for the proxy module

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ========== Validated Domain Types ==========

/// URL of the SPARQL endpoint queries are forwarded to
#[nutype(
    derive(Clone, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| s.starts_with("http://") || s.starts_with("https://")),
)]
pub struct EndpointUrl(String);

/// Namespace prefix scoping all cache keys for one proxy instance
#[nutype(
    derive(Clone, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| !s.is_empty() && !s.contains(':')),
)]
pub struct CacheNamespace(String);

/// Maximum response body size captured for caching and logging
#[nutype(
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct CaptureLimit(usize);

/// Cache entry lifetime in seconds
#[nutype(
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |ttl: &u64| *ttl > 0),
)]
pub struct TtlSeconds(u64);

// ========== Configuration ==========

/// Static credential sent to the endpoint as HTTP Basic authentication
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Authentication {
    pub user: String,
    pub password: String,
}

/// URL substitution applied to query text before dispatch
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
}

/// Backend operation used to execute a query
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryOperation {
    /// POST with the query as the raw request body
    #[default]
    PostDirect,
    /// POST with a form-encoded `query` field
    PostUrlencoded,
    /// GET with a `query` URL parameter
    Get,
}

impl QueryOperation {
    /// Per-request dispatch decision: a request without query text always
    /// becomes a plain GET, whatever operation is configured.
    pub fn resolve(self, has_text: bool) -> DispatchMode {
        if !has_text {
            return DispatchMode::PlainGet;
        }
        match self {
            Self::PostDirect => DispatchMode::PostDirect,
            Self::PostUrlencoded => DispatchMode::PostUrlencoded,
            Self::Get => DispatchMode::Get,
        }
    }
}

/// How a single request is sent to the endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    PostDirect,
    PostUrlencoded,
    Get,
    /// GET without a query parameter, lets the endpoint serve its default
    /// response
    PlainGet,
}

/// Proxy configuration, immutable for the process lifetime
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub endpoint_url: EndpointUrl,
    pub query_operation: QueryOperation,
    /// Response deadline; `None` disables the timeout guard
    pub timeout: Option<Duration>,
    pub capture_limit: CaptureLimit,
    pub authentication: Option<Authentication>,
    /// Static headers sent with every upstream request
    pub headers: HashMap<String, String>,
    pub rewrite: Option<RewriteRule>,
}

/// Cache store configuration
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Store URL; `None` disables caching
    pub url: Option<String>,
    pub namespace: CacheNamespace,
    pub ttl: TtlSeconds,
    pub disabled: bool,
    pub clear_at_startup: bool,
}

// ========== Request / Cache Data ==========

/// Query derived from an inbound request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingQuery {
    /// Absent on a no-parameter GET, which dispatches as a plain GET
    pub text: Option<String>,
    /// Negotiated response format, participates in the cache key
    pub accept: String,
}

/// Serialized form of a cached response
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub data: String,
}

// ========== Errors ==========

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
