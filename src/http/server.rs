//! HTTP server setup and the DoH request pipeline.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID, CORS)
//! - Bind server to listener (plain or TLS)
//! - Run each DoH request through normalize → cache → forward → respond
//!
//! # Request States
//! ```text
//! Start → Normalized → CacheChecked ─┬─ hit ──────────────────────────────▶ Respond
//!                                    └─ miss → Forwarding → Forwarded
//!                                              → CachePopulated ──────────▶ Respond
//! any stage ─ error ─▶ Failed(stage)
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, request::Parts, Method, Request},
    response::Response,
    routing::{any, get},
    Router,
};
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::cache::{CachedResponse, ResponseCache};
use crate::config::ProxyConfig;
use crate::doh::{normalize, NormalizeOptions, ProxyError};
use crate::http::landing;
use crate::http::request::{request_id, UuidRequestId};
use crate::http::response::{self, CacheStatus, CORS_HEADERS};
use crate::observability::metrics;
use crate::upstream::{UpstreamForwarder, UpstreamSetupError};

/// Path of the uncached passthrough endpoint.
pub const PASSTHROUGH_PATH: &str = "/api/proxy";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ResponseCache>,
    pub upstream: UpstreamForwarder,
    pub normalize: Arc<NormalizeOptions>,
    pub doh_path: Arc<str>,
    /// Deadline for one request, upstream exchange included.
    pub request_timeout: Duration,
}

/// Pipeline stage a request failed in, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ReadBody,
    Normalize,
    Forward,
    Deadline,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::ReadBody => "read_body",
            Stage::Normalize => "normalize",
            Stage::Forward => "forward",
            Stage::Deadline => "deadline",
        }
    }
}

/// HTTP server for the DoH proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    cache: Arc<ResponseCache>,
}

impl HttpServer {
    /// Create a new HTTP server with a fresh cache sized from `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, UpstreamSetupError> {
        let cache = Arc::new(ResponseCache::new(
            config.cache.max_entries,
            Duration::from_secs(config.cache.ttl_secs),
        ));
        Self::with_cache(config, cache)
    }

    /// Create a server around an existing cache.
    pub fn with_cache(
        config: ProxyConfig,
        cache: Arc<ResponseCache>,
    ) -> Result<Self, UpstreamSetupError> {
        let upstream = UpstreamForwarder::new(&config.upstream)?;

        let state = AppState {
            cache: cache.clone(),
            upstream,
            normalize: Arc::new(NormalizeOptions::from(&config.doh)),
            doh_path: Arc::from(config.doh.path.as_str()),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            cache,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The request deadline is enforced inside the handlers so a timeout
    /// still produces a JSON error body.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let [origin, methods, headers] = CORS_HEADERS;

        Router::new()
            .route(&config.doh.path, any(doh_handler))
            .route(PASSTHROUGH_PATH, any(passthrough_handler))
            .route("/health", get(landing::health))
            .route("/", get(landing::landing))
            .with_state(state)
            .layer(SetResponseHeaderLayer::overriding(origin.0, origin.1))
            .layer(SetResponseHeaderLayer::overriding(methods.0, methods.1))
            .layer(SetResponseHeaderLayer::overriding(headers.0, headers.1))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Run the server, accepting connections on the given listener until
    /// Ctrl+C or a message on `shutdown`.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS using the configured certificate.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let Some(tls) = self.config.listener.tls.clone() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "listener.tls is not configured",
            ));
        };
        crate::net::tls::serve_tls(addr, &tls, self.router, shutdown_signal(shutdown)).await
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// DoH endpoint handler.
async fn doh_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);
    let method = parts.method.clone();

    if method == Method::OPTIONS {
        metrics::record_request(method.as_str(), 204, "none", start_time);
        return response::preflight(state.cache.ttl());
    }

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        uri = %parts.uri,
        "DoH request"
    );

    let outcome = tokio::time::timeout(state.request_timeout, resolve(&state, &parts, body))
        .await
        .unwrap_or_else(|_| Err((Stage::Deadline, ProxyError::Timeout(state.request_timeout))));

    match outcome {
        Ok((answer, cache_status)) => {
            tracing::debug!(
                request_id = %request_id,
                cache = cache_status.as_str(),
                format = %answer.format,
                "DoH answer"
            );
            metrics::record_request(method.as_str(), 200, cache_status.label(), start_time);
            response::doh_answer(answer, state.cache.ttl(), cache_status)
        }
        Err((stage, error)) => {
            if error.is_upstream()
                || matches!(error, ProxyError::Internal(_) | ProxyError::Timeout(_))
            {
                tracing::error!(
                    request_id = %request_id,
                    stage = stage.as_str(),
                    method = %method,
                    uri = %parts.uri,
                    error = %error,
                    "DoH request failed"
                );
            } else {
                tracing::warn!(
                    request_id = %request_id,
                    stage = stage.as_str(),
                    method = %method,
                    uri = %parts.uri,
                    error = %error,
                    "DoH request rejected"
                );
            }
            metrics::record_request(method.as_str(), error.status().as_u16(), "none", start_time);
            response::doh_error(error, state.cache.ttl())
        }
    }
}

/// Normalize, consult the cache, and forward on a miss.
async fn resolve(
    state: &AppState,
    parts: &Parts,
    body: Body,
) -> Result<(CachedResponse, CacheStatus), (Stage, ProxyError)> {
    let body = if parts.method == Method::POST {
        read_body(body, state.normalize.max_message_bytes)
            .await
            .map_err(|e| (Stage::ReadBody, e))?
    } else {
        Bytes::new()
    };

    let params = query_params(parts.uri.query());
    let query = normalize(&parts.method, &parts.headers, &params, body, &state.normalize)
        .map_err(|e| (Stage::Normalize, e))?;
    let key = query.cache_key();

    if let Some(hit) = state.cache.get(&key) {
        metrics::record_cache_lookup("hit");
        tracing::debug!(cache_key = %key, "Cache hit");
        return Ok((hit, CacheStatus::Hit));
    }
    metrics::record_cache_lookup("miss");

    let result = state
        .upstream
        .forward(&query)
        .await
        .map_err(|e| (Stage::Forward, e))?;

    let answer = CachedResponse {
        format: query.format(),
        body: result.body,
    };
    state.cache.put(key, answer.clone());
    Ok((answer, CacheStatus::Miss))
}

/// Uncached passthrough handler; propagates the upstream status.
async fn passthrough_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);

    if parts.method == Method::OPTIONS {
        return response::preflight(state.cache.ttl());
    }

    let relay = async {
        let body = read_body(body, state.normalize.max_message_bytes).await?;
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        state
            .upstream
            .relay(&parts.method, parts.uri.query(), content_type, body)
            .await
    };
    let outcome = tokio::time::timeout(state.request_timeout, relay)
        .await
        .unwrap_or_else(|_| Err(ProxyError::Timeout(state.request_timeout)));

    match outcome {
        Ok(result) => {
            metrics::record_request(
                parts.method.as_str(),
                result.status.as_u16(),
                "bypass",
                start_time,
            );
            response::relayed(result)
        }
        Err(error) => {
            tracing::error!(
                request_id = %request_id,
                method = %parts.method,
                uri = %parts.uri,
                error = %error,
                "Passthrough request failed"
            );
            metrics::record_request(
                parts.method.as_str(),
                error.status().as_u16(),
                "bypass",
                start_time,
            );
            response::doh_error(error, state.cache.ttl())
        }
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if exceeds_limit(&e) {
            ProxyError::PayloadTooLarge { max: limit }
        } else {
            tracing::debug!(error = %e, "Failed to read request body");
            ProxyError::Internal(format!("failed to read request body: {e}"))
        }
    })
}

/// Whether a body read failed because the size limit was hit.
fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn query_params(raw: Option<&str>) -> HashMap<String, String> {
    raw.map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Wait for Ctrl+C or an explicit shutdown broadcast.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = shutdown.recv() => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[test]
    fn test_query_params_decodes() {
        let params = query_params(Some("name=example.com&type=AAAA&x=a%20b"));
        assert_eq!(params["name"], "example.com");
        assert_eq!(params["type"], "AAAA");
        assert_eq!(params["x"], "a b");
        assert!(query_params(None).is_empty());
    }

    #[test]
    fn test_server_builds_with_defaults() {
        let server = HttpServer::new(ProxyConfig::default()).unwrap();
        assert!(server.cache().is_enabled());
        assert_eq!(server.config().doh.path, "/dns-query");
    }

    #[tokio::test]
    async fn test_router_answers_preflight_with_cors() {
        let server = HttpServer::new(ProxyConfig::default()).unwrap();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/dns-query")
            .body(Body::empty())
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert!(headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_router_rejects_missing_parameter_without_upstream() {
        let server = HttpServer::new(ProxyConfig::default()).unwrap();
        let request = Request::builder()
            .uri("/dns-query?name=")
            .header(header::ACCEPT, "application/dns-json")
            .body(Body::empty())
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=60");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let err = read_body(Body::from(vec![0u8; 32]), 16).await.unwrap_err();
        assert!(matches!(err, ProxyError::PayloadTooLarge { max: 16 }));
        assert!(read_body(Body::from(vec![0u8; 16]), 16).await.is_ok());
    }

    #[tokio::test]
    async fn test_other_body_errors_are_not_size_errors() {
        let reset = axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        assert!(!exceeds_limit(&reset));

        let limited = axum::body::to_bytes(Body::from(vec![0u8; 32]), 16)
            .await
            .unwrap_err();
        assert!(exceeds_limit(&limited));
    }
}
