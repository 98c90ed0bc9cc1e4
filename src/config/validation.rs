//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and formats.
//! All problems are collected so an operator sees every mistake at once.

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::ServerConfig;

/// Upper bound for any configured duration, in seconds (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for `enumeration.max_404_per_minute`. Every 404 in the window
/// is kept per client, so the threshold bounds tracker memory.
pub const MAX_404_PER_MINUTE: u64 = 10_000;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("invalid kimai.base_url '{0}'")]
    BaseUrl(String),

    #[error("invalid extra header '{name}'")]
    ExtraHeader { name: String },

    #[error("server token must not be empty")]
    EmptyToken,
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    match Url::parse(&config.kimai.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::BaseUrl(config.kimai.base_url.clone())),
    }

    if matches!(config.auth.server_token.as_deref(), Some(t) if t.trim().is_empty()) {
        errors.push(ValidationError::EmptyToken);
    }

    let durations: [(&'static str, u64); 5] = [
        ("rate_limit.cleanup_interval_seconds", config.rate_limit.cleanup_interval_seconds),
        ("enumeration.block_duration_seconds", config.enumeration.block_duration_seconds),
        ("sessions.session_ttl_seconds", config.sessions.session_ttl_seconds),
        ("sessions.cleanup_interval_seconds", config.sessions.cleanup_interval_seconds),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    let counts: [(&'static str, u64, u64); 4] = [
        ("rate_limit.requests_per_minute", u64::from(config.rate_limit.requests_per_minute), u64::MAX),
        ("rate_limit.burst_limit", u64::from(config.rate_limit.burst_limit), u64::MAX),
        ("enumeration.max_404_per_minute", u64::from(config.enumeration.max_404_per_minute), MAX_404_PER_MINUTE),
        ("sessions.max_sessions", config.sessions.max_sessions as u64, u64::MAX),
    ];
    let bounded = durations
        .into_iter()
        .map(|(field, value)| (field, value, MAX_DURATION_SECS))
        .chain(counts);
    for (field, value, max) in bounded {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        } else if value > max {
            errors.push(ValidationError::TooLarge { field, max });
        }
    }

    for (name, value) in &config.security.extra_headers {
        if HeaderName::try_from(name.as_str()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::ExtraHeader { name: name.clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
