//! Upstream dispatch to the SPARQL endpoint
//!
//! Builds one HTTP request per inbound query, with the verb and encoding
//! selected by the dispatch mode. Header layering: configured static headers,
//! then the Basic credential, then the per-request Accept value, which always
//! wins because content negotiation is per client.

use axum::body::Body;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::proxy::types::{DispatchMode, EndpointUrl, ProxyConfig, ProxyError, ProxyResult};

pub const CONTENT_TYPE_SPARQL_QUERY: &str = "application/sparql-query";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// HTTP client for the configured endpoint
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    endpoint_url: EndpointUrl,
    base_headers: HeaderMap,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> ProxyResult<Self> {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build_http();

        let base_headers = build_base_headers(config)?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            base_headers,
        })
    }

    /// Execute one query against the endpoint, returning the streaming
    /// response.
    pub async fn dispatch(
        &self,
        text: Option<String>,
        mode: DispatchMode,
        accept: Option<HeaderValue>,
    ) -> ProxyResult<hyper::Response<Incoming>> {
        let request = build_request(
            &self.endpoint_url,
            mode,
            text.as_deref(),
            &self.base_headers,
            accept,
        )?;

        Ok(self.client.request(request).await?)
    }
}

/// `Authorization` value for a static Basic credential
pub fn auth_basic_header(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
}

fn build_base_headers(config: &ProxyConfig) -> ProxyResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in &config.headers {
        let name = name.parse::<HeaderName>().map_err(|_| {
            ProxyError::Internal(format!("invalid configured header name: {name}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            ProxyError::Internal(format!("invalid configured header value for {name}"))
        })?;
        headers.insert(name, value);
    }

    if let Some(auth) = &config.authentication {
        let value = HeaderValue::from_str(&auth_basic_header(&auth.user, &auth.password))
            .map_err(|_| ProxyError::Internal("invalid authentication credential".to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

fn build_request(
    endpoint_url: &EndpointUrl,
    mode: DispatchMode,
    text: Option<&str>,
    base_headers: &HeaderMap,
    accept: Option<HeaderValue>,
) -> ProxyResult<Request<Body>> {
    let (method, uri, content_type, body) = match mode {
        DispatchMode::PlainGet => (
            Method::GET,
            parse_uri(endpoint_url.as_ref())?,
            None,
            Body::empty(),
        ),
        DispatchMode::Get => {
            let text = require_text(text)?;
            let uri = format!("{endpoint_url}?query={}", urlencoding::encode(text));
            (Method::GET, parse_uri(&uri)?, None, Body::empty())
        }
        DispatchMode::PostDirect => (
            Method::POST,
            parse_uri(endpoint_url.as_ref())?,
            Some(CONTENT_TYPE_SPARQL_QUERY),
            Body::from(require_text(text)?.to_string()),
        ),
        DispatchMode::PostUrlencoded => {
            let body = format!("query={}", urlencoding::encode(require_text(text)?));
            (
                Method::POST,
                parse_uri(endpoint_url.as_ref())?,
                Some(CONTENT_TYPE_FORM),
                Body::from(body),
            )
        }
    };

    let mut request = Request::builder().method(method).uri(uri).body(body)?;
    let headers = request.headers_mut();
    headers.extend(base_headers.clone());

    // the request's Accept always wins over any configured default
    if let Some(accept) = accept {
        headers.insert(ACCEPT, accept);
    }
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    Ok(request)
}

fn parse_uri(uri: &str) -> ProxyResult<Uri> {
    uri.parse()
        .map_err(|e: http::uri::InvalidUri| ProxyError::Http(e.into()))
}

fn require_text(text: Option<&str>) -> ProxyResult<&str> {
    text.ok_or_else(|| ProxyError::Internal("missing query text for dispatch mode".to_string()))
}
