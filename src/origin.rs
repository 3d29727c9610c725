//! Origin allow-listing and CORS header rendering.
//!
//! Without a configured allow-list every origin is accepted.  That default
//! exists for local development and is not a security boundary: CORS only
//! constrains browsers, and a missing `Origin` header is treated as `*`.

use axum::http::{header, HeaderMap, HeaderValue};

pub const ALLOW_METHODS: &str = "POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, X-API-Key";
pub const MAX_AGE_SECS: &str = "86400";

/// Parsed `ALLOWED_ORIGINS` value.  Entries are trimmed and empty entries
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    origins: Vec<String>,
}

impl AllowList {
    pub fn parse(raw: &str) -> Self {
        let origins = raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        Self { origins }
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginDecision {
    pub allowed: bool,
    /// Value for `Access-Control-Allow-Origin`; `None` when denied.
    pub origin: Option<String>,
}

impl OriginDecision {
    fn allow(origin: impl Into<String>) -> Self {
        Self {
            allowed: true,
            origin: Some(origin.into()),
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            origin: None,
        }
    }
}

pub fn check_origin(request_origin: Option<&str>, allow_list: Option<&AllowList>) -> OriginDecision {
    let Some(list) = allow_list else {
        return OriginDecision::allow(request_origin.unwrap_or("*"));
    };
    match request_origin {
        Some(origin) if list.contains(origin) => OriginDecision::allow(origin),
        _ => OriginDecision::deny(),
    }
}

/// Read the `Origin` header; non-UTF8 values count as absent.
pub fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
}

pub fn cors_headers(origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let allow_origin =
        HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(MAX_AGE_SECS),
    );
    headers
}
