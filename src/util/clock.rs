//! Wall-clock helpers for log fields.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    system_time_ms(SystemTime::now())
}

/// Milliseconds since the Unix epoch for `time`; zero for times before it.
#[must_use]
pub fn system_time_ms(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

/// `base + delay`, clamped to roughly thirty years instead of overflowing `Instant`.
#[must_use]
pub fn deadline_from(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay)
        .unwrap_or_else(|| base + Duration::from_secs(60 * 60 * 24 * 365 * 30))
}
