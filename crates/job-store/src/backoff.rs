//! Retry backoff schedule.

use chrono::Duration;
use rand::Rng;

/// Base delay for the first retry.
const BASE_SECS: f64 = 2.0;

/// Upper bound for any single delay.
const MAX_SECS: f64 = 15.0 * 60.0;

/// Jitter fraction applied around the exponential delay.
const JITTER: f64 = 0.25;

/// Computes the delay before the next attempt after `attempt` failures.
///
/// Exponential (`2^attempt` seconds, capped at 15 minutes) with ±25%
/// jitter so that a burst of failures does not reschedule every job
/// onto the same instant.
pub fn retry_delay(attempt: i32) -> Duration {
    let exp = BASE_SECS.powi(attempt.max(1)).min(MAX_SECS);
    let jitter = rand::thread_rng().gen_range(-JITTER..=JITTER);
    let secs = (exp * (1.0 + jitter)).max(0.0);
    Duration::milliseconds((secs * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_with_attempts() {
        // Compare midpoints by sampling: with ±25% jitter the ranges for
        // attempt 1 (1.5..=2.5s) and attempt 4 (12..=20s) cannot overlap.
        for _ in 0..50 {
            let early = retry_delay(1);
            let late = retry_delay(4);
            assert!(early < late, "expected {early} < {late}");
        }
    }

    #[test]
    fn test_delay_is_capped() {
        for _ in 0..50 {
            let d = retry_delay(60);
            assert!(d <= Duration::seconds((MAX_SECS * (1.0 + JITTER)) as i64 + 1));
        }
    }

    #[test]
    fn test_delay_is_positive() {
        for attempt in 1..10 {
            assert!(retry_delay(attempt) > Duration::zero());
        }
    }
}
