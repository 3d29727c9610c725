//! Small request helpers shared by the handler and the guards.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Identify the calling client for rate limiting.
///
/// Proxy-provided addresses win over the socket peer: `CF-Connecting-IP`
/// first, then the left-most `X-Forwarded-For` entry.  Falls back to
/// `"unknown"` so every caller without an address shares one bucket.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header_value("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(first) = header_value("x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}
