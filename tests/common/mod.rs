//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use futures_util::StreamExt;
use tower::ServiceExt;

use kimai_mcp_remote::config::ServerConfig;
use kimai_mcp_remote::security::ServerToken;
use kimai_mcp_remote::HttpServer;

pub const TOKEN: &str = "integration-test-token";

/// Config with generous limits; tests tighten what they exercise.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.rate_limit.burst_limit = 100;
    config.enumeration.max_404_per_minute = 100;
    config
}

pub fn server(config: ServerConfig) -> HttpServer {
    HttpServer::new(config, ServerToken::new(TOKEN)).unwrap()
}

/// Request builder carrying the peer address the listener would attach.
pub fn request(method: Method, uri: &str, peer: &str) -> axum::http::request::Builder {
    let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(addr))
}

pub fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn get(router: &Router, uri: &str, peer: &str) -> Response<Body> {
    send(router, request(Method::GET, uri, peer).body(Body::empty()).unwrap()).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Next SSE frame from a streaming body, as text.
pub async fn next_frame(stream: &mut axum::body::BodyDataStream) -> String {
    loop {
        let chunk = stream.next().await.expect("stream ended").unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        // Skip keep-alive comments.
        if !text.trim().is_empty() && !text.starts_with(':') {
            return text;
        }
    }
}

/// Extract the session id from an `endpoint` event.
pub fn session_id_from_endpoint(frame: &str) -> String {
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("endpoint event without data");
    data.trim()
        .strip_prefix("/messages?session_id=")
        .expect("unexpected endpoint")
        .to_string()
}
