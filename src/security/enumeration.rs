//! Enumeration attack protection.
//!
//! Clients probing guessed identifiers produce a burst of 404s. Each client
//! gets a rolling one-minute window of 404 timestamps; crossing the
//! threshold blocks the client for a fixed duration. Blocked clients receive
//! the same 404 a genuine miss produces, after a random delay, so the block
//! itself reveals nothing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use rand::Rng;
use serde_json::json;
use tokio::time::Instant;

use crate::clock::deadline_after;
use crate::config::EnumerationConfig;
use crate::observability::metrics;
use crate::security::client_ip::client_identity;

const WINDOW: Duration = Duration::from_secs(60);

/// Delay bounds applied before answering a blocked client.
const BLOCKED_DELAY_MIN: Duration = Duration::from_millis(100);
const BLOCKED_DELAY_MAX: Duration = Duration::from_millis(300);

#[derive(Debug, Default)]
struct NotFoundTracker {
    events: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl NotFoundTracker {
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.events.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_blocked_at(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }
}

/// Per-client 404 accounting.
#[derive(Debug)]
pub struct EnumerationProtection {
    trackers: DashMap<String, NotFoundTracker>,
    max_404_per_minute: usize,
    block_duration: Duration,
}

impl EnumerationProtection {
    pub fn new(max_404_per_minute: u32, block_duration_seconds: u64) -> Self {
        Self {
            trackers: DashMap::new(),
            max_404_per_minute: max_404_per_minute as usize,
            block_duration: Duration::from_secs(block_duration_seconds),
        }
    }

    pub fn from_config(config: &EnumerationConfig) -> Self {
        Self::new(config.max_404_per_minute, config.block_duration_seconds)
    }

    /// Record a 404 for `client_id`.
    ///
    /// Returns true only on the call that starts a new block. Use
    /// [`is_blocked`](Self::is_blocked) for steady-state checks.
    pub fn record_404(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut tracker = self.trackers.entry(client_id.to_owned()).or_default();

        tracker.prune(now);
        tracker.events.push_back(now);

        if tracker.events.len() > self.max_404_per_minute && !tracker.is_blocked_at(now) {
            tracker.blocked_until = Some(deadline_after(now, self.block_duration));
            tracing::warn!(
                client = %client_id,
                not_found = tracker.events.len(),
                block_secs = self.block_duration.as_secs(),
                "Possible enumeration attack, blocking client"
            );
            metrics::record_enumeration_block();
            return true;
        }
        false
    }

    /// Whether `client_id` is currently blocked. Expired blocks are purged.
    pub fn is_blocked(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let Some(mut tracker) = self.trackers.get_mut(client_id) else {
            return false;
        };

        match tracker.blocked_until {
            Some(until) if until > now => true,
            Some(_) => {
                tracker.blocked_until = None;
                tracing::debug!(client = %client_id, "Enumeration block expired");
                false
            }
            None => false,
        }
    }

    /// Drop trackers with no recent 404s and no active block.
    pub fn cleanup_old_entries(&self) -> usize {
        let now = Instant::now();
        let before = self.trackers.len();
        self.trackers.retain(|_, tracker| {
            tracker.prune(now);
            !tracker.events.is_empty() || tracker.is_blocked_at(now)
        });
        before.saturating_sub(self.trackers.len())
    }

    pub fn entry_count(&self) -> usize {
        self.trackers.len()
    }
}

/// Sleep for a uniformly random duration in `[min, max]`.
pub async fn random_delay(min: Duration, max: Duration) {
    let delay = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    tokio::time::sleep(delay).await;
}

/// The 404 body shared by genuine misses and blocked clients.
pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not_found", "message": "Resource not found" })),
    )
        .into_response()
}

/// Middleware that rejects blocked clients and feeds downstream 404s into
/// the tracker.
pub async fn enumeration_guard_middleware(
    State(protection): State<Arc<EnumerationProtection>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_identity(&request);

    if protection.is_blocked(client.as_str()) {
        metrics::record_rejected("enumeration");
        random_delay(BLOCKED_DELAY_MIN, BLOCKED_DELAY_MAX).await;
        return not_found();
    }

    let response = next.run(request).await;
    if response.status() == StatusCode::NOT_FOUND {
        protection.record_404(client.as_str());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_allows_initial_404s() {
        let protection = EnumerationProtection::new(5, 300);
        for _ in 0..5 {
            assert!(!protection.record_404("1.2.3.4"));
        }
        assert!(!protection.is_blocked("1.2.3.4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_after_threshold() {
        let protection = EnumerationProtection::new(3, 300);
        for _ in 0..3 {
            assert!(!protection.record_404("1.2.3.4"));
        }
        assert!(protection.record_404("1.2.3.4"));
        assert!(protection.is_blocked("1.2.3.4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_triggering_call_reports_block() {
        let protection = EnumerationProtection::new(1, 60);
        assert!(!protection.record_404("c"));
        assert!(protection.record_404("c"));
        assert!(!protection.record_404("c"));
        assert!(protection.is_blocked("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_expires_and_is_purged() {
        let protection = EnumerationProtection::new(1, 1);
        protection.record_404("1.2.3.4");
        protection.record_404("1.2.3.4");
        assert!(protection.is_blocked("1.2.3.4"));

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(!protection.is_blocked("1.2.3.4"));
        let tracker = protection.trackers.get("1.2.3.4").unwrap();
        assert!(tracker.blocked_until.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_block_duration_saturates() {
        let protection = EnumerationProtection::new(1, u64::MAX);
        assert!(!protection.record_404("x"));
        assert!(protection.record_404("x"));
        assert!(protection.is_blocked("x"));

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert!(protection.is_blocked("x"));
        assert_eq!(protection.cleanup_old_entries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls() {
        let protection = EnumerationProtection::new(2, 60);
        assert!(!protection.record_404("c"));
        assert!(!protection.record_404("c"));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(!protection.record_404("c"));
        assert!(!protection.record_404("c"));
        assert!(!protection.is_blocked("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_clients_independent() {
        let protection = EnumerationProtection::new(2, 60);
        protection.record_404("ip1");
        protection.record_404("ip1");
        assert!(protection.record_404("ip1"));

        assert!(!protection.record_404("ip2"));
        assert!(!protection.is_blocked("ip2"));
        assert!(protection.is_blocked("ip1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_client_not_blocked() {
        let protection = EnumerationProtection::new(1, 60);
        assert!(!protection.is_blocked("never-seen"));
        assert_eq!(protection.entry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_old_entries() {
        let protection = EnumerationProtection::new(3, 1);
        for _ in 0..4 {
            protection.record_404("blocked");
        }
        protection.record_404("quiet");
        assert_eq!(protection.cleanup_old_entries(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(protection.cleanup_old_entries(), 2);
        assert_eq!(protection.entry_count(), 0);
        assert!(!protection.is_blocked("blocked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_keeps_active_block() {
        let protection = EnumerationProtection::new(1, 600);
        protection.record_404("c");
        protection.record_404("c");

        tokio::time::advance(Duration::from_secs(120)).await;

        assert_eq!(protection.cleanup_old_entries(), 0);
        assert!(protection.is_blocked("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_delay_within_bounds() {
        let start = Instant::now();
        random_delay(Duration::from_millis(100), Duration::from_millis(200)).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed <= Duration::from_millis(210));
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_delay_degenerate_range() {
        let start = Instant::now();
        random_delay(Duration::from_millis(50), Duration::from_millis(10)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
