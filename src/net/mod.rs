//! Network transport.
//!
//! Plain TCP is served straight from `axum::serve` in `http::server`;
//! this module only adds the optional TLS listener.

pub mod tls;
