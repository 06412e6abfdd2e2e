//! Client address resolution for admission control.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Resolve the client IP.
///
/// With `trust_forwarded`, the order is: first entry of `X-Forwarded-For`,
/// then `X-Real-IP`, then the socket peer. Unparsable header values are
/// skipped. Without it only the socket peer counts, since any client can
/// set those headers.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> Option<IpAddr> {
    if !trust_forwarded {
        return peer.map(|addr| addr.ip());
    }

    // Try X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // Take the first IP (original client)
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str().map(str::trim).unwrap_or("").parse::<IpAddr>() {
            return Some(ip);
        }
    }

    peer.map(|addr| addr.ip())
}

/// `User-Agent` header, if present and valid UTF-8.
pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
