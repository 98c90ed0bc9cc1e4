//! Client identity extraction.
//!
//! Precedence: first hop of `X-Forwarded-For`, then `X-Real-IP`, then the
//! peer address of the TCP connection. Missing or blank values fall through
//! to the next source; extraction never fails.

use std::fmt;
use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request},
};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Identity used to partition per-client protection state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the identity from forwarding headers or the connection peer.
pub fn resolve_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientIdentity {
    forwarded_for(headers)
        .or_else(|| header_str(headers, X_REAL_IP).map(str::to_owned))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .map(ClientIdentity)
        .unwrap_or_else(ClientIdentity::unknown)
}

/// Identity of a request, reusing one resolved earlier in the chain.
pub fn client_identity<B>(request: &Request<B>) -> ClientIdentity {
    if let Some(identity) = request.extensions().get::<ClientIdentity>() {
        return identity.clone();
    }
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    resolve_identity(request.headers(), peer)
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, X_FORWARDED_FOR)?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
