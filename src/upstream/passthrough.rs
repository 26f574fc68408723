//! Uncached passthrough to the upstream resolver.
//!
//! Forwards the client's query string and body verbatim and hands back the
//! upstream status and end-to-end headers, so it is useful for debugging
//! the upstream itself.

use axum::body::Bytes;
use axum::http::{header, HeaderValue, Method};

use crate::doh::query::{DNS_JSON_CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE};
use crate::doh::ProxyError;
use crate::observability::metrics;
use crate::upstream::forwarder::{unreachable, UpstreamForwarder, UpstreamResult};

/// Accept header sent upstream; the client's own choice is not consulted.
const PASSTHROUGH_ACCEPT: &str = "application/dns-json, application/dns-message, application/json";

impl UpstreamForwarder {
    /// Relay a request upstream without normalization or caching.
    ///
    /// Any upstream status, including errors, is returned as-is.
    pub async fn relay(
        &self,
        method: &Method,
        raw_query: Option<&str>,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<UpstreamResult, ProxyError> {
        if *method != Method::GET && *method != Method::POST {
            return Err(ProxyError::MethodNotAllowed(method.clone()));
        }

        let mut url = self.url.clone();
        if let Some(q) = raw_query.filter(|q| !q.is_empty()) {
            url.set_query(Some(q));
        }

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::ACCEPT, PASSTHROUGH_ACCEPT);
        if *method == Method::POST {
            request = request
                .header(header::CONTENT_TYPE, content_type.unwrap_or(DNS_JSON_CONTENT_TYPE))
                .body(body);
        }

        let response = request.send().await.map_err(unreachable)?;
        let status = response.status();
        let mut headers = response.headers().clone();
        headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(DNS_MESSAGE_CONTENT_TYPE));
        let body = response.bytes().await.map_err(unreachable)?;

        metrics::record_upstream(if status.is_success() { "ok" } else { "error_status" });
        Ok(UpstreamResult {
            status,
            headers,
            body,
        })
    }
}
