//! Deadline arithmetic on the tokio clock.
//!
//! Durations come from configuration, so adding them to an `Instant` must
//! never overflow.

use std::time::Duration;
use tokio::time::Instant;

/// Furthest deadline handed out, about thirty years.
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + after`, clamped to [`FAR_FUTURE`].
pub fn deadline_after(start: Instant, after: Duration) -> Instant {
    start.checked_add(after.min(FAR_FUTURE)).unwrap_or(start)
}
