//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (peer address recorded via ConnectInfo)
//!     → server.rs (Axum setup, middleware chain)
//!     → security layers (headers, rate limit, enumeration guard, auth)
//!     → handlers.rs (health, SSE connect, message post)
//!     → Send to client
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer, ServerError};
