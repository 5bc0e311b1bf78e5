//! Reconnect backoff policy
//!
//! Exponential backoff with a delay ceiling and an optional attempt budget.

use std::time::Duration;

/// Exponent clamp keeping `base * 2^n` inside u64 millisecond range
const MAX_EXPONENT: u32 = 31;

/// Backoff schedule for reconnect attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts = None` retries forever.
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (zero-based): `base * 2^attempt`,
    /// capped at the configured maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(MAX_EXPONENT);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Check whether the attempt budget is spent
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(60), None);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), None);
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
        // Large attempt numbers must not overflow
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_budget_exhaustion() {
        let unlimited = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), None);
        assert!(!unlimited.is_exhausted(u32::MAX));

        let bounded = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), Some(3));
        assert!(!bounded.is_exhausted(2));
        assert!(bounded.is_exhausted(3));
        assert!(bounded.is_exhausted(4));
    }
}
