//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Build protection components → Start session sweep → Listen
//!
//! Shutdown:
//!     Signal received → Stop accepting → Stop janitor and session sweep → Close sessions → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
