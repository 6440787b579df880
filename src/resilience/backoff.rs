//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` 0 yields no delay; each further attempt doubles `base`, capped at `max`,
/// plus up to 10% jitter on top of the capped value.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    let capped = base.saturating_mul(factor).min(max);

    let jitter_range = capped.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    capped + Duration::from_millis(jitter)
}

/// Delay before the next poll cycle given the number of consecutive failed cycles.
///
/// Healthy cycles run at `interval`; failing ones back off from `interval` up to `max`.
pub fn poll_delay(interval: Duration, consecutive_failures: u32, max: Duration) -> Duration {
    if consecutive_failures == 0 {
        return interval;
    }
    calculate_backoff(consecutive_failures, interval, max.max(interval))
}
