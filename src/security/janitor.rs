//! Periodic eviction of idle per-client protection state.
//!
//! Without it, every distinct client identity (spoofed forwarding headers,
//! address churn) would leave a bucket and a 404 tracker behind forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::clock::deadline_after;
use crate::security::enumeration::EnumerationProtection;
use crate::security::rate_limit::TokenBucketRateLimiter;

pub struct ProtectionJanitor {
    limiter: Arc<TokenBucketRateLimiter>,
    enumeration: Arc<EnumerationProtection>,
    interval: Duration,
}

impl ProtectionJanitor {
    pub fn new(
        limiter: Arc<TokenBucketRateLimiter>,
        enumeration: Arc<EnumerationProtection>,
        interval: Duration,
    ) -> Self {
        Self {
            limiter,
            enumeration,
            interval,
        }
    }

    /// One sweep. Buckets are dropped only once they are idle for both the
    /// interval and a full refill, so eviction never hands out extra tokens.
    pub fn sweep(&self) -> (usize, usize) {
        let max_age = self.interval.max(self.limiter.refill_time());
        let buckets = self.limiter.cleanup_old_entries(max_age);
        let trackers = self.enumeration.cleanup_old_entries();
        if buckets > 0 || trackers > 0 {
            tracing::debug!(buckets, trackers, "Protection state swept");
        }
        (buckets, trackers)
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Protection janitor starting");

        let start = deadline_after(time::Instant::now(), self.interval);
        let mut ticker = time::interval_at(start, self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Protection janitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
