//! Response construction.
//!
//! # Responsibilities
//! - Render cached/upstream answers with DoH headers
//! - Answer CORS preflight
//! - Provide the CORS header set applied to every response
//!
//! # Design Decisions
//! - Content-Type follows the negotiated format, not the upstream header
//! - Successful answers advertise the proxy TTL via Cache-Control
//! - Every DoH endpoint response, errors included, carries the proxy TTL;
//!   errors are still never stored in the proxy cache
//! - Relayed responses keep upstream headers minus hop-by-hop ones

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::cache::CachedResponse;
use crate::doh::ProxyError;
use crate::upstream::UpstreamResult;

/// Header reporting whether the answer came from the cache.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Headers attached to every response so browsers can call the proxy.
pub const CORS_HEADERS: [(HeaderName, HeaderValue); 3] = [
    (
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    ),
    (
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    ),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Accept"),
    ),
];

/// Where an answer was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }

    /// Label used in metrics.
    pub const fn label(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn cache_control(ttl: Duration) -> HeaderValue {
    HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static("public"))
}

/// 200 response carrying a DoH answer.
pub fn doh_answer(answer: CachedResponse, ttl: Duration, cache: CacheStatus) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(answer.format.media_type())),
            (header::CACHE_CONTROL, cache_control(ttl)),
            (X_CACHE, HeaderValue::from_static(cache.as_str())),
        ],
        answer.body,
    )
        .into_response()
}

/// Error response for a failed DoH request.
pub fn doh_error(error: ProxyError, ttl: Duration) -> Response {
    let mut response = error.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, cache_control(ttl));
    response
}

/// Answer to a CORS preflight request.
pub fn preflight(ttl: Duration) -> Response {
    (StatusCode::NO_CONTENT, [(header::CACHE_CONTROL, cache_control(ttl))]).into_response()
}

/// Relay an upstream response with its status and end-to-end headers.
pub fn relayed(result: UpstreamResult) -> Response {
    let UpstreamResult {
        status,
        mut headers,
        body,
    } = result;
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);

    let mut response = (status, body).into_response();
    response.headers_mut().extend(headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use crate::doh::DohFormat;

    #[test]
    fn test_answer_headers() {
        let response = doh_answer(
            CachedResponse {
                format: DohFormat::Json,
                body: Bytes::from_static(b"{}"),
            },
            Duration::from_secs(300),
            CacheStatus::Hit,
        );

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/dns-json");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=300");
        assert_eq!(headers[X_CACHE], "HIT");
    }

    #[test]
    fn test_error_carries_proxy_ttl() {
        let response = doh_error(ProxyError::MissingParameter("dns"), Duration::from_secs(60));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=60");
    }

    #[test]
    fn test_preflight_is_no_content() {
        let response = preflight(Duration::from_secs(30));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=30");
    }

    #[test]
    fn test_relayed_keeps_end_to_end_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=300"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let response = relayed(UpstreamResult {
            status: StatusCode::BAD_GATEWAY,
            headers,
            body: Bytes::from_static(b"bad"),
        });

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CACHE_CONTROL], "max-age=300");
        assert!(!headers.contains_key(header::CONNECTION));
        assert!(!headers.contains_key(header::TRANSFER_ENCODING));
    }
}
