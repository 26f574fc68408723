//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ttl > 0)
//! - Check that addresses and the upstream URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// Routes served besides the DoH endpoint.
const RESERVED_PATHS: [&str; 3] = ["/", "/health", "/api/proxy"];

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstream.url `{0}` is not a valid http(s) URL")]
    InvalidUpstreamUrl(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("doh.path `{0}` must start with '/'")]
    InvalidPath(String),

    #[error("doh.path `{0}` collides with a built-in route")]
    ReservedPath(String),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check every semantic constraint on `config`.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    match Url::parse(&config.upstream.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => errors.push(ValidationError::InvalidUpstreamUrl(config.upstream.url.clone())),
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("upstream.timeout_secs"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("upstream.connect_timeout_secs"));
    }
    if config.cache.ttl_secs == 0 {
        errors.push(ValidationError::ZeroValue("cache.ttl_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.doh.max_message_bytes == 0 {
        errors.push(ValidationError::ZeroValue("doh.max_message_bytes"));
    }

    if !config.doh.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath(config.doh.path.clone()));
    } else if RESERVED_PATHS.contains(&config.doh.path.as_str()) {
        errors.push(ValidationError::ReservedPath(config.doh.path.clone()));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
