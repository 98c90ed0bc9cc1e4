//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the remote
//! server. All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the remote MCP server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Client authentication.
    pub auth: AuthConfig,

    /// Upstream time-tracking service.
    pub kimai: KimaiConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Token bucket rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Repeated 404 detection.
    pub enumeration: EnumerationConfig,

    /// Remote session registry.
    pub sessions: SessionConfig,

    /// Response header hardening.
    pub security: SecurityConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Bearer token authentication for MCP clients.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret clients present. Generated at startup when unset.
    pub server_token: Option<String>,
}

/// Upstream time-tracking service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KimaiConfig {
    /// Base URL of the Kimai instance, reported by the health endpoint.
    pub base_url: String,
}

impl Default for KimaiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Timeout for non-streaming requests in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Rate limiting configuration.
///
/// `burst_limit` may exceed `requests_per_minute`; a large burst lets a fresh
/// client issue its initial requests back to back.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Steady-state refill rate.
    pub requests_per_minute: u32,

    /// Bucket capacity.
    pub burst_limit: u32,

    /// Enable rate limiting.
    pub enabled: bool,

    /// Interval between idle-bucket sweeps in seconds.
    pub cleanup_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_limit: 10,
            enabled: true,
            cleanup_interval_seconds: 300,
        }
    }
}

impl RateLimitConfig {
    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

/// Enumeration protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EnumerationConfig {
    /// 404 responses tolerated per client within one minute.
    pub max_404_per_minute: u32,

    /// How long a client stays blocked once the threshold is crossed.
    pub block_duration_seconds: u64,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            max_404_per_minute: 10,
            block_duration_seconds: 300,
        }
    }
}

/// Session registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of concurrently registered sessions.
    pub max_sessions: usize,

    /// Idle time after which a session expires.
    pub session_ttl_seconds: u64,

    /// Interval between background sweeps.
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            session_ttl_seconds: 3600,
            cleanup_interval_seconds: 300,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

/// Security hardening configuration.
///
/// The required security headers are always sent; only extras are configurable.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Additional response headers, merged with the defaults.
    pub extra_headers: BTreeMap<String, String>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
