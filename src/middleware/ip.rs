//! Client address extraction for the rate limiter.
//!
//! The key for a client is the host part of its address, never the port, so
//! every connection from one machine shares a bucket.
//!
//! # Forwarding headers
//!
//! `X-Forwarded-For` and `X-Real-IP` are honoured only when the TCP peer is a
//! configured trusted proxy. With no `TRUSTED_PROXIES` set the peer address is
//! always used; a client talking to us directly cannot pick its own key.
//!
//! ```text
//!   ConnectInfo<SocketAddr> ──► peer trusted? ──no──► peer host
//!                                    │
//!                                   yes
//!                                    ▼
//!             X-Forwarded-For (first hop) ► X-Real-IP ► peer host
//! ```

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use tracing::debug;

use super::rate_limit::TrustedProxyConfig;
use crate::error::{AppError, AppResult};

/// Where a forwarded address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractedIp {
    FromXff(IpAddr),
    FromRealIp(IpAddr),
    NotFound,
}

/// Parse a forwarded value that may carry a port (`1.2.3.4:80`, `[::1]:80`).
fn parse_host(value: &str) -> Option<IpAddr> {
    let value = value.trim();
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

fn extract_ip_from_headers(headers: &HeaderMap) -> ExtractedIp {
    // "client, proxy1, proxy2": the first entry is the client
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
        && let Some(ip) = parse_host(first)
    {
        return ExtractedIp::FromXff(ip);
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && let Some(ip) = parse_host(value)
    {
        return ExtractedIp::FromRealIp(ip);
    }

    ExtractedIp::NotFound
}

/// Host address of the client that sent `req`.
///
/// # Errors
///
/// `AppError::Internal` when the connection's peer address is unavailable,
/// which means the server was started without connect info.
pub fn client_host<B>(req: &Request<B>, trusted_proxies: &TrustedProxyConfig) -> AppResult<IpAddr> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or_else(|| {
            AppError::Internal("remote address unavailable for rate limiting".to_string())
        })?;

    Ok(resolve_host(peer, req.headers(), trusted_proxies))
}

/// Pick the client address given the peer and the request headers.
pub fn resolve_host(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &TrustedProxyConfig) -> IpAddr {
    if !trusted_proxies.is_trusted(peer) {
        return peer;
    }

    match extract_ip_from_headers(headers) {
        ExtractedIp::FromXff(ip) => {
            debug!(client_ip = %ip, proxy = %peer, "Client address from X-Forwarded-For");
            ip
        }
        ExtractedIp::FromRealIp(ip) => {
            debug!(client_ip = %ip, proxy = %peer, "Client address from X-Real-IP");
            ip
        }
        ExtractedIp::NotFound => peer,
    }
}
