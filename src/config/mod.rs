//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (main.rs)
//!     → ServerConfig (validated, immutable)
//!     → plain sub-configs handed to each protection component
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Components never read the environment themselves

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, CorsConfig, EnumerationConfig, KimaiConfig, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, SecurityConfig, ServerConfig, SessionConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
