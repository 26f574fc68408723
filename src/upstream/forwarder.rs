//! Forwarding of normalized queries to the upstream DoH resolver.
//!
//! Wire format (HTTP):
//! ```text
//! GET  <upstream>?name=<name>&type=<type>   Accept: application/dns-json
//! GET  <upstream>?dns=<base64url>           Accept: application/dns-message
//! POST <upstream>                           Content-Type/Accept: application/dns-message
//! ```

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use base64::Engine;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::doh::query::{BASE64_URL, DNS_MESSAGE_CONTENT_TYPE};
use crate::doh::{DohFormat, ProxyError, Query, QueryMethod};
use crate::observability::metrics;

/// Raw outcome of one upstream exchange.
#[derive(Debug, Clone)]
pub struct UpstreamResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Error building the forwarder at startup.
#[derive(Debug, Error)]
pub enum UpstreamSetupError {
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client for the single configured upstream resolver.
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    pub(super) client: reqwest::Client,
    pub(super) url: Url,
}

impl UpstreamForwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamSetupError> {
        let url = Url::parse(&config.url)?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL the given query is sent to.
    pub fn request_url(&self, query: &Query) -> Url {
        let mut url = self.url.clone();
        match query {
            Query::Json { name, record_type } => {
                url.query_pairs_mut()
                    .append_pair("name", name)
                    .append_pair("type", record_type);
            }
            Query::Wire {
                method: QueryMethod::Get,
                message,
            } => {
                url.query_pairs_mut()
                    .append_pair("dns", &BASE64_URL.encode(message));
            }
            Query::Wire {
                method: QueryMethod::Post,
                ..
            } => {}
        }
        url
    }

    /// Send `query` upstream and return the successful answer.
    ///
    /// Non-2xx answers become [`ProxyError::UpstreamError`]; connection
    /// failures and timeouts become [`ProxyError::UpstreamUnreachable`].
    pub async fn forward(&self, query: &Query) -> Result<UpstreamResult, ProxyError> {
        let url = self.request_url(query);
        let accept = query.format().media_type();

        tracing::debug!(upstream = %url, format = %query.format(), "Forwarding query upstream");

        let request = match query {
            Query::Wire {
                method: QueryMethod::Post,
                message,
            } => self
                .client
                .post(url)
                .header(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
                .body(message.clone()),
            _ => self.client.get(url),
        };

        let response = request
            .header(header::ACCEPT, accept)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            metrics::record_upstream("error_status");
            tracing::warn!(status = %status, "Upstream returned non-success status");
            return Err(ProxyError::UpstreamError(status));
        }

        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(unreachable)?;

        if query.format() == DohFormat::Json {
            if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
                metrics::record_upstream("invalid_body");
                return Err(ProxyError::Internal(format!(
                    "upstream returned invalid JSON: {e}"
                )));
            }
        }

        metrics::record_upstream("ok");
        Ok(UpstreamResult {
            status,
            headers,
            body,
        })
    }
}

pub(super) fn unreachable(e: reqwest::Error) -> ProxyError {
    metrics::record_upstream("unreachable");
    let reason = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    ProxyError::UpstreamUnreachable(reason)
}
