//! Retry and exponential backoff policy for the delivery queues

use serde::{Deserialize, Serialize};

/// Largest shift applied to the base delay, keeps `base << n` from overflowing
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Retry budget and backoff curve for one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before a row moves to the dead-letter queue
    pub max_attempts: u32,
    /// Delay after the first failed attempt is `2 * base_delay_ms`
    pub base_delay_ms: u64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Default policy for the alert delivery queue
    pub const fn alerts() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 5_000,
            max_delay_ms: 10 * 60 * 1000,
        }
    }

    /// Default policy for the status-update reconciliation queue
    pub const fn status_updates() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 60 * 1000,
        }
    }

    /// Delay before the next attempt, given the attempt count after the failure
    ///
    /// `base * 2^attempts`, capped at `max_delay_ms`. Never shrinks as
    /// `attempts` grows.
    pub fn backoff_ms(&self, attempts: u32) -> u64 {
        let exponent = attempts.min(MAX_BACKOFF_EXPONENT);
        self.base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
            .max(1)
    }

    /// Absolute time of the next attempt
    pub fn next_retry_at(&self, now_ms: i64, attempts: u32) -> i64 {
        let delay = i64::try_from(self.backoff_ms(attempts)).unwrap_or(i64::MAX);
        now_ms.saturating_add(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::alerts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.backoff_ms(1), 200);
        assert_eq!(policy.backoff_ms(2), 400);
        assert_eq!(policy.backoff_ms(3), 800);
        assert_eq!(policy.backoff_ms(4), 1_000);
        assert_eq!(policy.backoff_ms(60), 1_000);
    }

    #[test]
    fn test_backoff_never_shrinks() {
        let policy = RetryPolicy::alerts();
        let mut previous = 0;
        for attempts in 0..=64 {
            let delay = policy.backoff_ms(attempts);
            assert!(delay >= previous, "delay shrank at attempt {attempts}");
            previous = delay;
        }
    }

    #[test]
    fn test_next_retry_strictly_increases_when_retried_on_time() {
        let policy = RetryPolicy::status_updates();
        let mut now = 1_000_000;
        let mut last = i64::MIN;
        for attempts in 1..policy.max_attempts {
            let next = policy.next_retry_at(now, attempts);
            assert!(next > last);
            last = next;
            // The next attempt cannot run before it is due
            now = next;
        }
    }

    #[test]
    fn test_zero_base_still_moves_forward() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 0,
            max_delay_ms: 0,
        };
        assert_eq!(policy.next_retry_at(10, 1), 11);
    }
}
