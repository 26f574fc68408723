//! Canonical query model and cache key derivation.

use std::fmt;

use axum::body::Bytes;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

/// Media type of the RFC 8484 binary encoding.
pub const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// Media type of the JSON encoding served by public resolvers.
pub const DNS_JSON_CONTENT_TYPE: &str = "application/dns-json";

/// Record type used when a JSON query omits `type`.
pub const DEFAULT_RECORD_TYPE: &str = "A";

/// base64url without padding on encode; accepts padded and unpadded input.
pub const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The two DoH encodings a client can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DohFormat {
    WireMessage,
    Json,
}

impl DohFormat {
    /// Pick the format from an `Accept` header value.
    ///
    /// Absent or unrecognised values select the wire format.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(value) if value.contains(DNS_JSON_CONTENT_TYPE) => DohFormat::Json,
            _ => DohFormat::WireMessage,
        }
    }

    pub const fn media_type(self) -> &'static str {
        match self {
            DohFormat::WireMessage => DNS_MESSAGE_CONTENT_TYPE,
            DohFormat::Json => DNS_JSON_CONTENT_TYPE,
        }
    }
}

impl fmt::Display for DohFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DohFormat::WireMessage => "wire",
            DohFormat::Json => "json",
        })
    }
}

/// HTTP method a wire-format query arrived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMethod {
    Get,
    Post,
}

impl QueryMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            QueryMethod::Get => "GET",
            QueryMethod::Post => "POST",
        }
    }
}

/// A validated DoH query, independent of how its headers were spelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// JSON API lookup, always issued as GET.
    Json { name: String, record_type: String },
    /// Opaque DNS wire message.
    Wire { method: QueryMethod, message: Bytes },
}

impl Query {
    pub fn format(&self) -> DohFormat {
        match self {
            Query::Json { .. } => DohFormat::Json,
            Query::Wire { .. } => DohFormat::WireMessage,
        }
    }

    pub fn method(&self) -> QueryMethod {
        match self {
            Query::Json { .. } => QueryMethod::Get,
            Query::Wire { method, .. } => *method,
        }
    }

    /// Derive the cache key for this query.
    ///
    /// Wire messages are keyed on their canonical unpadded base64url form,
    /// so padded and unpadded GET parameters collide.
    pub fn cache_key(&self) -> CacheKey {
        match self {
            Query::Json { name, record_type } => CacheKey(format!("json:{name}:{record_type}")),
            Query::Wire { method, message } => CacheKey(format!(
                "dns:{}:{}",
                method.as_str(),
                BASE64_URL.encode(message)
            )),
        }
    }
}

/// Deterministic identifier of a cacheable query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey(value.to_string())
    }
}
