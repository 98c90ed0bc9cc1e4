//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mcp_requests_rejected_total` (counter): rejections by reason
//! - `mcp_enumeration_blocks_total` (counter): blocks started by repeated 404s
//! - `mcp_sessions_active` (gauge): sessions currently registered
//! - `mcp_sessions_expired_total` (counter): sessions removed by TTL sweep
//!
//! Recording is a no-op until a recorder is installed, so unit tests need no setup.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// A request was turned away before reaching its handler.
pub fn record_rejected(reason: &'static str) {
    counter!("mcp_requests_rejected_total", "reason" => reason).increment(1);
}

pub fn record_enumeration_block() {
    counter!("mcp_enumeration_blocks_total").increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("mcp_sessions_active").set(count as f64);
}

pub fn record_sessions_expired(count: usize) {
    counter!("mcp_sessions_expired_total").increment(count as u64);
}
