//! Query extraction from inbound requests
//!
//! Derives the query text and the negotiated response format from a request.
//! The dispatch mode is a per-request decision made from the result (see
//! [`QueryOperation::resolve`](crate::proxy::types::QueryOperation::resolve)),
//! never shared state.

use http::Method;

use crate::proxy::types::IncomingQuery;

/// Accept value used when the client sent none
pub const DEFAULT_ACCEPT: &str = "*/*";

/// Name of the query parameter and form field carrying the query text
const QUERY_FIELD: &str = "query";

/// Derive the query from an inbound request.
///
/// Returns `None` for methods this proxy does not handle; the caller answers
/// those with a 404. A handled request without query text (`text: None`) is
/// dispatched as a plain GET so the endpoint can serve its default response.
pub fn extract_query(
    method: &Method,
    raw_query: Option<&str>,
    content_type: Option<&str>,
    accept: Option<&str>,
    body: &[u8],
) -> Option<IncomingQuery> {
    let text = match *method {
        Method::GET => raw_query.and_then(find_query_param),
        Method::POST => extract_post_body(content_type, body),
        _ => return None,
    };

    Some(IncomingQuery {
        text,
        accept: accept.unwrap_or(DEFAULT_ACCEPT).to_string(),
    })
}

fn find_query_param(raw_query: &str) -> Option<String> {
    url::form_urlencoded::parse(raw_query.as_bytes())
        .find(|(name, _)| name == QUERY_FIELD)
        .map(|(_, value)| value.into_owned())
}

/// The `query` field of a form-encoded body, falling back to the raw body
/// text, which covers `application/sparql-query` and other raw content types.
fn extract_post_body(content_type: Option<&str>, body: &[u8]) -> Option<String> {
    if is_form_encoded(content_type) {
        if let Some(text) = find_query_param(&String::from_utf8_lossy(body)) {
            return Some(text);
        }
    }

    if body.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(body).into_owned())
}

fn is_form_encoded(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| {
            media_type.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}
