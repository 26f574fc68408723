//! Informational endpoints: landing page and health.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::http::server::AppState;

/// Plain-text usage notice served at `/`.
pub async fn landing(State(state): State<AppState>) -> String {
    format!(
        "DoH proxy\n\
         \n\
         DNS over HTTPS forwarding proxy for {upstream}.\n\
         \n\
         JSON:  GET  {path}?name=example.com&type=A   (Accept: application/dns-json)\n\
         Wire:  GET  {path}?dns=<base64url>           (Accept: application/dns-message)\n\
         Wire:  POST {path}                           (Content-Type: application/dns-message)\n\
         \n\
         Status: running\n",
        upstream = state.upstream.url(),
        path = state.doh_path,
    )
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let stats = state.cache.stats();
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cache_entries: stats.entries,
        cache_hits: stats.hits,
        cache_misses: stats.misses,
    })
}
