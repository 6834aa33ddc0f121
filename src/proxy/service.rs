//! Main proxy service implementation
//!
//! `SparqlProxyService` composes the per-request control flow: query
//! extraction, cache-aside lookup, upstream dispatch raced against the
//! configured deadline, response normalization and bounded capture. Every
//! branch produces exactly one response, so a late upstream completion can
//! never write after the timeout answer has been sent.
//!
//! ## Service Lifecycle
//!
//! ```rust,ignore
//! let service = SparqlProxyService::init(proxy_config, &cache_config).await?;
//! let router = SparqlProxyService::into_router(Arc::new(service));
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::proxy::cache::CacheLayer;
use crate::proxy::cache_key::build_key;
use crate::proxy::capture::CaptureStream;
use crate::proxy::normalize::{filter_headers, forward_status, headers_to_map};
use crate::proxy::query::extract_query;
use crate::proxy::types::{
    CacheConfig, CacheEntry, DispatchMode, ProxyConfig, ProxyError, ProxyResult,
};
use crate::proxy::upstream::UpstreamClient;

/// Main proxy service, shared across all requests
pub struct SparqlProxyService {
    config: ProxyConfig,
    upstream: UpstreamClient,
    cache: Option<CacheLayer>,
}

/// Outcome of an upstream dispatch raced against the deadline
enum Dispatched {
    Response(hyper::Response<Incoming>),
    TimedOut(std::time::Duration),
    Failed(ProxyError),
}

impl SparqlProxyService {
    /// Create a service without a cache.
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        Self::with_cache(config, None)
    }

    /// Create a service around an already-initialized cache layer.
    pub fn with_cache(config: ProxyConfig, cache: Option<CacheLayer>) -> ProxyResult<Self> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self {
            config,
            upstream,
            cache,
        })
    }

    /// Full startup path: connect the cache store once; an unreachable store
    /// degrades to running without a cache.
    pub async fn init(config: ProxyConfig, cache_config: &CacheConfig) -> ProxyResult<Self> {
        let cache = CacheLayer::init(cache_config).await;
        Self::with_cache(config, cache)
    }

    /// Create an Axum router exposing the proxy.
    pub fn into_router(service: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .fallback(proxy_handler)
            .with_state(service)
            .layer(TraceLayer::new_for_http())
    }

    /// Handle one request end to end.
    pub async fn handle(&self, request: Request) -> Response {
        let started = Instant::now();
        let (parts, body) = request.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(error) => {
                warn!(%error, "failed to read request body");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        let accept_value = parts.headers.get(ACCEPT).cloned();
        let accept = parts
            .headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok());

        let Some(incoming) =
            extract_query(&parts.method, parts.uri.query(), content_type, accept, &body)
        else {
            return StatusCode::NOT_FOUND.into_response();
        };

        debug!(endpoint = %self.config.endpoint_url, "handling SPARQL request");

        let text = incoming.text.map(|text| self.rewrite(text));
        match &text {
            Some(query) => debug!(%query, "SPARQL query"),
            None => debug!("no SPARQL query, issuing a plain GET"),
        }

        // cache lookup always comes before any upstream call
        let cache_key = self
            .cache
            .as_ref()
            .map(|cache| build_key(&cache.namespace, &incoming.accept, text.as_deref()));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(entry) = cache.store.get(key).await {
                return replay_cached(entry);
            }
        }

        let mode = self.config.query_operation.resolve(text.is_some());

        match self.dispatch_with_deadline(text, mode, accept_value).await {
            Dispatched::Response(response) => self.forward_response(response, cache_key, started),
            Dispatched::TimedOut(deadline) => {
                let millis = deadline.as_millis();
                warn!(timeout_ms = millis as u64, "upstream did not answer before the deadline");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    format!("timeout after {millis} ms"),
                )
                    .into_response()
            }
            Dispatched::Failed(error) => {
                warn!(%error, "upstream dispatch failed");
                (StatusCode::BAD_GATEWAY, "upstream request failed").into_response()
            }
        }
    }

    /// Race the dispatch against the configured deadline.
    ///
    /// The dispatch runs as its own task, so a fired deadline answers the
    /// client without aborting the upstream call; the detached task finishes
    /// on its own and its result is discarded.
    async fn dispatch_with_deadline(
        &self,
        text: Option<String>,
        mode: DispatchMode,
        accept: Option<HeaderValue>,
    ) -> Dispatched {
        let upstream = self.upstream.clone();

        match self.config.timeout {
            Some(deadline) => {
                let call =
                    tokio::spawn(async move { upstream.dispatch(text, mode, accept).await });
                match tokio::time::timeout(deadline, call).await {
                    Ok(Ok(Ok(response))) => Dispatched::Response(response),
                    Ok(Ok(Err(error))) => Dispatched::Failed(error),
                    Ok(Err(join_error)) => Dispatched::Failed(ProxyError::Internal(format!(
                        "dispatch task failed: {join_error}"
                    ))),
                    Err(_) => Dispatched::TimedOut(deadline),
                }
            }
            None => match upstream.dispatch(text, mode, accept).await {
                Ok(response) => Dispatched::Response(response),
                Err(error) => Dispatched::Failed(error),
            },
        }
    }

    /// Stream the upstream response to the client while capturing it for the
    /// cache and diagnostics.
    fn forward_response(
        &self,
        response: hyper::Response<Incoming>,
        cache_key: Option<String>,
        started: Instant,
    ) -> Response {
        let (parts, body) = response.into_parts();
        let raw_status = parts.status;
        let headers = filter_headers(&parts.headers);

        let (tee, capture_rx) = CaptureStream::new(
            body.into_data_stream(),
            self.config.capture_limit.into_inner(),
        );

        // store and log after the stream has drained, off the response path
        let cache = self.cache.clone();
        let entry_headers = headers_to_map(&headers);
        tokio::spawn(async move {
            let Ok(capture) = capture_rx.await else {
                return;
            };
            debug!(
                status = raw_status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                length = capture.length,
                "upstream response complete"
            );

            let (Some(cache), Some(key)) = (cache, cache_key) else {
                return;
            };
            if raw_status.as_u16() >= 400 {
                return;
            }
            match capture.text {
                Some(data) => {
                    let entry = CacheEntry {
                        status: raw_status.as_u16(),
                        headers: entry_headers,
                        data,
                    };
                    cache.store.put(&key, &entry, cache.ttl).await;
                }
                None => {
                    debug!(
                        length = capture.length,
                        "response exceeded the capture limit, not cached"
                    );
                }
            }
        });

        let mut response = Response::new(Body::from_stream(tee));
        *response.status_mut() = forward_status(raw_status);
        *response.headers_mut() = headers;
        response
    }

    fn rewrite(&self, text: String) -> String {
        match &self.config.rewrite {
            Some(rule) => text.replace(&rule.from, &rule.to),
            None => text,
        }
    }
}

/// Replay a stored response.
fn replay_cached(entry: CacheEntry) -> Response {
    let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);

    let mut response = Response::new(Body::from(entry.data));
    *response.status_mut() = forward_status(status);

    let headers = response.headers_mut();
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }
    response
}

/// Axum handler for proxying requests
async fn proxy_handler(
    State(service): State<Arc<SparqlProxyService>>,
    request: Request,
) -> Response {
    service.handle(request).await
}

/// Health check handler
async fn health_handler() -> &'static str {
    "OK"
}
