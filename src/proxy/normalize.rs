//! Response status and header normalization
//!
//! The backend is infrastructure from the client's point of view, so its 404
//! and 500 answers are reported as a gateway fault. Transport headers are
//! stripped because the proxy re-streams decoded content, and `set-cookie`
//! must not leak through a shared cache.

use std::collections::BTreeMap;

use http::header::{
    CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, SET_COOKIE, TRANSFER_ENCODING,
};
use http::{HeaderMap, HeaderName, StatusCode};

/// Headers never forwarded to the client nor stored in the cache
const STRIPPED_HEADERS: [HeaderName; 5] = [
    CONNECTION,
    CONTENT_ENCODING,
    CONTENT_LENGTH,
    SET_COOKIE,
    TRANSFER_ENCODING,
];

/// Map an upstream status to the one forwarded to the client.
pub fn forward_status(status: StatusCode) -> StatusCode {
    match status {
        StatusCode::NOT_FOUND | StatusCode::INTERNAL_SERVER_ERROR => StatusCode::BAD_GATEWAY,
        other => other,
    }
}

/// Copy of `headers` without the stripped transport headers.
pub fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if !STRIPPED_HEADERS.contains(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Header subset stored with a cache entry; non-UTF-8 values are dropped.
pub fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_backend_errors_become_gateway_faults() {
        assert_eq!(
            forward_status(StatusCode::NOT_FOUND),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            forward_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_other_statuses_pass_through() {
        for status in [
            StatusCode::OK,
            StatusCode::NO_CONTENT,
            StatusCode::FOUND,
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert_eq!(forward_status(status), status);
        }
    }

    #[test]
    fn test_transport_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert(SET_COOKIE, HeaderValue::from_static("session=1"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("content-type", HeaderValue::from_static("text/turtle"));
        headers.insert("endpoint-header", HeaderValue::from_static("test"));

        let filtered = filter_headers(&headers);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.get("content-type").unwrap(), "text/turtle");
        assert_eq!(filtered.get("endpoint-header").unwrap(), "test");
    }

    #[test]
    fn test_multi_value_headers_survive_filtering() {
        let mut headers = HeaderMap::new();
        headers.append("vary", HeaderValue::from_static("accept"));
        headers.append("vary", HeaderValue::from_static("origin"));

        let filtered = filter_headers(&headers);
        assert_eq!(filtered.get_all("vary").iter().count(), 2);
    }

    #[test]
    fn test_headers_to_map_drops_non_utf8_values() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/turtle"));
        headers.insert("x-binary", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());

        let map = headers_to_map(&headers);
        assert_eq!(map.len(), 1);
        assert_eq!(map["content-type"], "text/turtle");
    }
}
