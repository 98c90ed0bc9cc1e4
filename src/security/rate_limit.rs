//! Per-client token bucket rate limiting.
//!
//! Buckets live in a sharded map so that two client identities never
//! contend on the same lock. A bucket is refilled and charged under its
//! shard lock, which is never held across an `.await`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::client_ip::{client_identity, ClientIdentity};

/// A single client's bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until one whole token is available.
    fn wait_secs(&self, refill_rate: f64) -> f64 {
        if self.tokens >= 1.0 || refill_rate <= 0.0 {
            0.0
        } else {
            (1.0 - self.tokens) / refill_rate
        }
    }
}

/// Admission control per client identity.
#[derive(Debug)]
pub struct TokenBucketRateLimiter {
    buckets: DashMap<String, TokenBucket>,
    config: RateLimitConfig,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucketRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: f64::from(config.burst_limit),
            refill_rate: config.refill_rate(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Charge one token to `client_id`. Returns false when the bucket is empty.
    pub fn is_allowed(&self, client_id: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut bucket = self
            .buckets
            .entry(client_id.to_owned())
            .or_insert_with(|| TokenBucket::new(self.capacity));

        bucket.try_acquire(self.capacity, self.refill_rate)
    }

    /// Time a rejected client should wait before its next token.
    pub fn retry_after(&self, client_id: &str) -> Duration {
        let secs = self
            .buckets
            .get(client_id)
            .map(|b| b.wait_secs(self.refill_rate))
            .unwrap_or(0.0);
        Duration::from_secs_f64(secs)
    }

    /// Time for an empty bucket to refill to capacity. A bucket idle this
    /// long is indistinguishable from a fresh one.
    pub fn refill_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.capacity / self.refill_rate).unwrap_or(Duration::MAX)
    }

    /// Drop buckets that have not been touched for `max_age`.
    /// A zero `max_age` drops every bucket.
    pub fn cleanup_old_entries(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < max_age);
        let removed = before.saturating_sub(self.buckets.len());

        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "Evicted idle rate limit buckets");
        }
        removed
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Middleware function for per-client rate limiting.
///
/// Every request is charged, whatever its headers claim about protocol
/// upgrades; the server has no route that hands a connection off.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<TokenBucketRateLimiter>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_identity(&request);

    if limiter.is_allowed(client.as_str()) {
        request.extensions_mut().insert(client);
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rejected("rate_limit");
        too_many_requests(&limiter, &client)
    }
}

fn too_many_requests(limiter: &TokenBucketRateLimiter, client: &ClientIdentity) -> Response {
    let retry_after = limiter.retry_after(client.as_str()).as_secs_f64().ceil().max(1.0) as u64;

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "rate_limit_exceeded",
            "message": "Too many requests, slow down",
            "retry_after": retry_after,
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
