//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, DoH pipeline)
//!     → request.rs (request ID)
//!     → doh::request (normalize) → cache → upstream
//!     → response.rs (DoH headers, CORS, errors)
//!     → Send to client
//! ```

pub mod landing;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::{CacheStatus, X_CACHE};
pub use server::{AppState, HttpServer};
