//! DoH protocol layer.
//!
//! # Data Flow
//! ```text
//! method + headers + params + body
//!     → request.rs (normalize, validate)
//!     → query.rs (Query, DohFormat, CacheKey)
//!     → error.rs (ProxyError → status + JSON body)
//! ```
//!
//! # Design Decisions
//! - Format is decided once from Accept and carried by the Query
//! - Wire payloads are never parsed, only decoded and size-checked

pub mod error;
pub mod query;
pub mod request;

pub use error::ProxyError;
pub use query::{CacheKey, DohFormat, Query, QueryMethod};
pub use request::{normalize, NormalizeOptions};
