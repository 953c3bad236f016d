//! Retry policy values
//!
//! Backoff is an explicit value handed to every adapter that retries, so
//! tests can inject [`RetryPolicy::immediate`] and never sleep.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff with a cap and bounded jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each following retry
    pub base_delay: Duration,
    /// Upper bound on the exponential delay
    pub max_delay: Duration,
    /// Maximum random delay added on top of the exponential delay
    pub jitter: Duration,
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// A policy that tries exactly once
    pub const fn no_retry() -> Self {
        Self::immediate(1)
    }

    /// Exponential delay before retry number `retry` (0-based), jitter excluded
    ///
    /// `base * 2^retry`, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Returns true if another attempt is allowed after `attempts_made`
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    /// Five attempts, 1s doubling, capped at 30s, up to 250ms jitter
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_immediate_never_waits() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(5), Duration::ZERO);
    }

    #[test]
    fn test_allows_another() {
        let policy = RetryPolicy::immediate(3);
        assert!(policy.allows_another(1));
        assert!(policy.allows_another(2));
        assert!(!policy.allows_another(3));

        // A zero-attempt policy still makes one attempt
        let zero = RetryPolicy::immediate(0);
        assert!(zero.allows_another(0));
        assert!(!zero.allows_another(1));
    }
}
