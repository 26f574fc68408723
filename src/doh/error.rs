//! Error taxonomy for the DoH request path.

use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Every way a DoH request can fail.
///
/// Validation variants are produced before any upstream I/O. All variants
/// render as a JSON body `{"error": <kind>, "detail": <message>}`.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("parameter `{0}` is not valid base64url")]
    InvalidParameter(&'static str),

    #[error("request body is empty")]
    EmptyBody,

    #[error("DNS message exceeds the {max} byte limit")]
    PayloadTooLarge { max: usize },

    #[error("unsupported media type {0:?}")]
    UnsupportedMediaType(Option<String>),

    #[error("upstream returned HTTP {0}")]
    UpstreamError(StatusCode),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("request not completed within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Stable name used in the `error` field of the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed(_) => "MethodNotAllowed",
            ProxyError::MissingParameter(_) => "MissingParameter",
            ProxyError::InvalidParameter(_) => "InvalidParameter",
            ProxyError::EmptyBody => "EmptyBody",
            ProxyError::PayloadTooLarge { .. } => "PayloadTooLarge",
            ProxyError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            ProxyError::UpstreamError(_) => "UpstreamError",
            ProxyError::UpstreamUnreachable(_) => "UpstreamUnreachable",
            ProxyError::Timeout(_) => "Timeout",
            ProxyError::Internal(_) => "InternalError",
        }
    }

    /// Status sent to the client. Upstream failures are always 500; a request
    /// that outlives `timeouts.request_secs` is 504.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::MissingParameter(_)
            | ProxyError::InvalidParameter(_)
            | ProxyError::EmptyBody => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ProxyError::UpstreamError(_)
            | ProxyError::UpstreamUnreachable(_)
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamError(_) | ProxyError::UpstreamUnreachable(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let detail = match &self {
            // Internal details stay in the logs.
            ProxyError::Internal(_) => None,
            other => Some(other.to_string()),
        };
        let body = ErrorBody {
            error: self.kind(),
            detail,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let ProxyError::MethodNotAllowed(_) = self {
            response.headers_mut().insert(
                header::ALLOW,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            );
        }
        response
    }
}
