//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (wraps everything; stamps response headers)
//!     → rate_limit.rs (per-client token bucket, 429 on empty bucket)
//!     → enumeration.rs (uniform 404 for blocked clients, counts 404s)
//!     → auth.rs (bearer token)
//!     → Pass to handlers
//! ```
//!
//! # Design Decisions
//! - Each component owns its state; handlers only see the decisions
//! - Per-client state lives in sharded maps, never one global lock
//! - Client identity resolution never fails (client_ip.rs)

pub mod auth;
pub mod client_ip;
pub mod enumeration;
pub mod headers;
pub mod janitor;
pub mod rate_limit;

pub use auth::ServerToken;
pub use client_ip::ClientIdentity;
pub use enumeration::{random_delay, EnumerationProtection};
pub use headers::SecurityHeadersLayer;
pub use janitor::ProtectionJanitor;
pub use rate_limit::TokenBucketRateLimiter;
