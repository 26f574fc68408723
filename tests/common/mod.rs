//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;

use doh_proxy::{HttpServer, ProxyConfig, ResponseCache, Shutdown};

/// A request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub query: Option<String>,
    pub accept: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

type Responder = dyn Fn(&RecordedRequest) -> (u16, &'static str, Vec<u8>) + Send + Sync;

struct MockState {
    respond: Box<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Handle to a running mock upstream resolver.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}/dns-query", self.addr)
    }

    pub fn call_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

/// Start a programmable mock upstream on an ephemeral port.
///
/// `respond` returns `(status, content_type, body)` for each request.
pub async fn start_mock_upstream<F>(respond: F) -> MockUpstream
where
    F: Fn(&RecordedRequest) -> (u16, &'static str, Vec<u8>) + Send + Sync + 'static,
{
    let state = Arc::new(MockState {
        respond: Box::new(respond),
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/dns-query", any(mock_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, state }
}

async fn mock_handler(State(state): State<Arc<MockState>>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let header_value = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        query: parts.uri.query().map(str::to_string),
        accept: header_value(header::ACCEPT),
        content_type: header_value(header::CONTENT_TYPE),
        body: body.to_vec(),
    };
    let (status, content_type, payload) = (state.respond)(&recorded);
    state.requests.lock().unwrap().push(recorded);

    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .header(header::CONTENT_TYPE, content_type)
        .header(MOCK_HEADER, "mock-resolver")
        .body(Body::from(payload))
        .unwrap()
}

/// Extra header set on every mock upstream response.
pub const MOCK_HEADER: &str = "x-upstream-server";

/// Upstream that accepts connections and never answers.
pub async fn start_silent_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/dns-query")
}

/// JSON answer in the shape public resolvers return.
pub fn json_answer(name: &str) -> Vec<u8> {
    serde_json::json!({
        "Status": 0,
        "TC": false,
        "RD": true,
        "RA": true,
        "Question": [{ "name": name, "type": 1 }],
        "Answer": [{ "name": name, "type": 1, "TTL": 300, "data": "93.184.216.34" }]
    })
    .to_string()
    .into_bytes()
}

/// Header-only DNS query message (ID 0xabcd, RD set, no sections).
pub const HEADER_ONLY_QUERY: [u8; 12] = [0xab, 0xcd, 0x01, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];

/// Proxy configuration pointing at `upstream`.
pub fn proxy_config(upstream: &MockUpstream) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.url = upstream.url();
    config.upstream.timeout_secs = 2;
    config
}

/// Handle to a running proxy.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub cache: Arc<ResponseCache>,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let server = HttpServer::new(config).unwrap();
    let cache = server.cache().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        cache,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
