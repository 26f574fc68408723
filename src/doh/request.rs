//! Request normalization.
//!
//! Turns the raw pieces of an inbound HTTP request into a [`Query`], or
//! rejects it before any upstream traffic happens.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, Method};
use base64::Engine;

use crate::config::DohConfig;
use crate::doh::error::ProxyError;
use crate::doh::query::{
    DohFormat, Query, QueryMethod, BASE64_URL, DEFAULT_RECORD_TYPE, DNS_JSON_CONTENT_TYPE,
    DNS_MESSAGE_CONTENT_TYPE,
};

/// Knobs the normalizer reads from [`DohConfig`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub strict_content_type: bool,
    pub max_message_bytes: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::from(&DohConfig::default())
    }
}

impl From<&DohConfig> for NormalizeOptions {
    fn from(config: &DohConfig) -> Self {
        Self {
            strict_content_type: config.strict_content_type,
            max_message_bytes: config.max_message_bytes,
        }
    }
}

/// Build a canonical [`Query`] from an inbound request.
///
/// OPTIONS is answered by the caller and is rejected here like any other
/// non GET/POST method.
pub fn normalize(
    method: &Method,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
    body: Bytes,
    options: &NormalizeOptions,
) -> Result<Query, ProxyError> {
    let accept = header_value(headers, &header::ACCEPT);

    if *method == Method::GET {
        if options.strict_content_type && !names_doh_media_type(accept.as_deref()) {
            return Err(ProxyError::UnsupportedMediaType(accept));
        }

        match DohFormat::from_accept(accept.as_deref()) {
            DohFormat::Json => {
                let name = non_empty(params, "name").ok_or(ProxyError::MissingParameter("name"))?;
                let record_type = non_empty(params, "type").unwrap_or(DEFAULT_RECORD_TYPE);
                Ok(Query::Json {
                    name: name.to_string(),
                    record_type: record_type.to_string(),
                })
            }
            DohFormat::WireMessage => {
                let encoded = non_empty(params, "dns").ok_or(ProxyError::MissingParameter("dns"))?;
                let message = BASE64_URL
                    .decode(encoded)
                    .map_err(|_| ProxyError::InvalidParameter("dns"))?;
                check_size(message.len(), options)?;
                Ok(Query::Wire {
                    method: QueryMethod::Get,
                    message: Bytes::from(message),
                })
            }
        }
    } else if *method == Method::POST {
        if options.strict_content_type {
            let content_type = header_value(headers, &header::CONTENT_TYPE);
            let is_wire = content_type
                .as_deref()
                .is_some_and(|v| v.contains(DNS_MESSAGE_CONTENT_TYPE));
            if !is_wire {
                return Err(ProxyError::UnsupportedMediaType(content_type));
            }
        }

        if DohFormat::from_accept(accept.as_deref()) == DohFormat::Json {
            tracing::debug!("JSON accept on POST, forwarding body as a wire message");
        }
        if body.is_empty() {
            return Err(ProxyError::EmptyBody);
        }
        check_size(body.len(), options)?;
        Ok(Query::Wire {
            method: QueryMethod::Post,
            message: body,
        })
    } else {
        Err(ProxyError::MethodNotAllowed(method.clone()))
    }
}

/// All values of `name` joined the way a single folded header would read.
fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn names_doh_media_type(accept: Option<&str>) -> bool {
    accept.is_some_and(|v| v.contains(DNS_MESSAGE_CONTENT_TYPE) || v.contains(DNS_JSON_CONTENT_TYPE))
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn check_size(len: usize, options: &NormalizeOptions) -> Result<(), ProxyError> {
    if len > options.max_message_bytes {
        return Err(ProxyError::PayloadTooLarge {
            max: options.max_message_bytes,
        });
    }
    Ok(())
}
