//! Cache key derivation
//!
//! Keys have the shape `namespace:accept-fingerprint:content-fingerprint`.
//! Both fingerprints are SHA-256 digests, so the key length is independent of
//! the query size and safe to use as a store key. Collisions would only cost
//! a wrong cache answer, not a security boundary.

use sha2::{Digest, Sha256};

use crate::proxy::types::CacheNamespace;

/// Content fingerprint used when a request carries no query text, so all
/// default GET requests share one cache slot per namespace and accept value.
const GET_QUERY_SENTINEL: &str = "get-query";

/// Build the cache key for a query.
///
/// Pure and deterministic: identical `(namespace, accept, text)` triples
/// always produce the same key. The accept value is lower-cased first so
/// equivalent negotiation headers collapse to one key.
pub fn build_key(namespace: &CacheNamespace, accept: &str, text: Option<&str>) -> String {
    let accept_fingerprint = sha256_hex(accept.to_lowercase().as_bytes());
    let content_fingerprint = match text {
        Some(text) => sha256_hex(text.as_bytes()),
        None => GET_QUERY_SENTINEL.to_string(),
    };

    format!("{namespace}:{accept_fingerprint}:{content_fingerprint}")
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
