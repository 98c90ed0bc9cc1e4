//! Remote transport for the Kimai MCP server.
//!
//! Hosts the HTTP/SSE endpoint MCP clients connect to and the protection
//! layer in front of it: per-client token bucket rate limiting, repeated-404
//! enumeration blocking, security response headers and a bounded registry of
//! remote sessions with sliding expiration.

pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod session;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
