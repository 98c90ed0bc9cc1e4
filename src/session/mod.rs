//! Remote session subsystem.
//!
//! # Data Flow
//! ```text
//! GET /sse      → manager.create(uuid, RemoteSession)   (503 when full)
//! POST /messages → manager.get(id) → RemoteSession::deliver → SSE stream
//! disconnect    → manager.remove(id) → Closeable::close
//! sweep task    → manager.cleanup_expired() every cleanup interval
//! ```

pub mod manager;
pub mod remote;

pub use manager::{Closeable, SessionManager};
pub use remote::{DeliveryError, RemoteSession, SessionEvent};
