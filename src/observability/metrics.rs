//! Metrics collection and exposition.
//!
//! # Metrics
//! - `doh_requests_total` (counter): requests by method, status, cache outcome
//! - `doh_request_duration_seconds` (histogram): latency distribution
//! - `doh_cache_lookups_total` (counter): hit / miss
//! - `doh_upstream_requests_total` (counter): upstream outcome
//! - `doh_cache_entries` (gauge): entries currently stored
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a finished client request.
pub fn record_request(method: &str, status: u16, cache: &'static str, start: Instant) {
    counter!(
        "doh_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache
    )
    .increment(1);
    histogram!("doh_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a cache lookup result (`hit` or `miss`).
pub fn record_cache_lookup(outcome: &'static str) {
    counter!("doh_cache_lookups_total", "outcome" => outcome).increment(1);
}

/// Record the outcome of one upstream exchange.
pub fn record_upstream(outcome: &'static str) {
    counter!("doh_upstream_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("doh_cache_entries").set(entries as f64);
}
