//! DNS-over-HTTPS forwarding proxy library.

pub mod cache;
pub mod config;
pub mod doh;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod upstream;

pub use cache::ResponseCache;
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
