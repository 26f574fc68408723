//! Upstream resolver client.
//!
//! # Data Flow
//! ```text
//! Query
//!     → forwarder.rs (build URL/body, send, classify status)
//!     → UpstreamResult (2xx only) or ProxyError
//!
//! raw request
//!     → passthrough.rs (relay verbatim, any status)
//! ```
//!
//! # Design Decisions
//! - One fixed upstream, no failover
//! - No retries; the client retries if it wants to
//! - Every call is bounded by the client timeout

pub mod forwarder;
pub mod passthrough;

pub use forwarder::{UpstreamForwarder, UpstreamResult, UpstreamSetupError};
