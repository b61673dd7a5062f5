//! Client key resolution.
//!
//! The key is the request's apparent origin: the first `X-Forwarded-For`
//! entry, then `X-Real-IP`, then the transport peer address, then
//! `"unknown"`. Forwarding headers are taken at face value, so the key is
//! spoofable by any client that can reach the service directly.

use std::borrow::Borrow;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;

pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const REAL_IP: &str = "x-real-ip";
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ClientKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[must_use]
pub fn resolve_client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientKey {
    let forwarded = header_str(headers, FORWARDED_FOR)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(first) = forwarded {
        return ClientKey::from(first);
    }

    let real_ip = header_str(headers, REAL_IP)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(ip) = real_ip {
        return ClientKey::from(ip);
    }

    peer.map_or_else(
        || ClientKey::from(UNKNOWN_CLIENT),
        |addr| ClientKey::from(addr.ip().to_string()),
    )
}

/// Peer address recorded by `into_make_service_with_connect_info`, if any.
#[must_use]
pub fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

#[must_use]
pub fn client_key_of(request: &Request) -> ClientKey {
    resolve_client_key(request.headers(), peer_addr(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("192.168.1.20:51000".parse().unwrap())
    }

    #[test]
    fn first_forwarded_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, " 9.9.9.9 , 10.0.0.1".parse().unwrap());
        headers.insert(REAL_IP, "8.8.8.8".parse().unwrap());
        assert_eq!(resolve_client_key(&headers, peer()).as_str(), "9.9.9.9");
    }

    #[test]
    fn empty_forwarded_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, ", 10.0.0.1".parse().unwrap());
        headers.insert(REAL_IP, " 8.8.8.8 ".parse().unwrap());
        assert_eq!(resolve_client_key(&headers, peer()).as_str(), "8.8.8.8");
    }

    #[test]
    fn peer_address_used_without_headers() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_client_key(&headers, peer()).as_str(), "192.168.1.20");
    }

    #[test]
    fn unknown_when_nothing_available() {
        let mut headers = HeaderMap::new();
        headers.insert(REAL_IP, "".parse().unwrap());
        assert_eq!(resolve_client_key(&headers, None).as_str(), UNKNOWN_CLIENT);
    }

    #[test]
    fn reads_connect_info_from_extensions() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("127.0.0.1:4000".parse().unwrap()));
        assert_eq!(client_key_of(&request).as_str(), "127.0.0.1");
    }
}
