//! Bearer token authentication for MCP clients.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;

use crate::observability::metrics;
use crate::security::client_ip::client_identity;

/// Shared secret checked against incoming requests.
#[derive(Clone)]
pub struct ServerToken(Arc<str>);

impl ServerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    /// Random 43-character token, similar in strength to 32 random bytes.
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(43)
            .map(char::from)
            .collect();
        Self::new(token)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check a presented token without short-circuiting on the first mismatch.
    pub fn verify(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(token) if !token.is_empty() => constant_time_eq(token.as_bytes(), self.0.as_bytes()),
            _ => false,
        }
    }
}

impl std::fmt::Debug for ServerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerToken(***)")
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Token from an `Authorization` header; both `Bearer <token>` and a bare
/// token are accepted.
pub fn presented_token(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value).trim()
}

pub async fn auth_middleware(
    State(token): State<ServerToken>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(presented_token);

    if token.verify(presented) {
        return next.run(request).await;
    }

    tracing::warn!(client = %client_identity(&request), "Rejected unauthenticated request");
    metrics::record_rejected("auth");

    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": "Invalid or missing authentication token",
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}
