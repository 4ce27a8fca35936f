//! Pure retry-policy functions: exponential backoff with a configurable
//! cap, and the "effective max retries" resolution rule used for dedup.

use std::time::Duration;

/// Delay before the next attempt, given a 0-based attempt number that just
/// failed. `2^attempt_num` seconds, capped at `max_backoff_seconds`.
///
/// Saturates rather than overflows for large `attempt_num` - the backoff is
/// already capped well before `u32` would matter, but a worker resuming a
/// very long-lived partial event should never panic on the shift.
pub fn backoff_delay(attempt_num: u32, max_backoff_seconds: u64) -> Duration {
    let uncapped = 1u64.checked_shl(attempt_num).unwrap_or(u64::MAX);
    Duration::from_secs(uncapped.min(max_backoff_seconds))
}

/// The retry budget for one (event, subscription) pair: the subscription's
/// override if present, else the broker-wide default (spec glossary:
/// "effective max retries").
pub fn effective_max_retries(subscription_override: Option<i32>, default: u32) -> u32 {
    subscription_override
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}
