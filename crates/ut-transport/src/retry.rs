//! Retry policy for connection establishment.
//!
//! Connect attempts are idempotent, so they may be retried with exponential
//! backoff. The policy is deliberately dumb: it only computes delays and
//! carries the attempt budget; the caller owns the loop because state
//! transitions happen between attempts.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with optional jitter.
///
/// `max_attempts` is the *total* attempt budget, not the number of retries:
/// a policy with `max_attempts = 3` dials at most three times. The delay
/// slept after failed attempt `k` (0-based) is `base_delay * backoff^k`,
/// jittered and capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: f64,
    /// Jitter factor in `[0.0, 1.0]`; the delay is scaled by a random factor
    /// in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff: 1.5,
            jitter: 0.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to sleep after failed attempt `attempt` (0-based) before the
    /// next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * self.backoff.powi(attempt as i32);
        let scaled = if self.jitter > 0.0 {
            let factor = 1.0 + (rand::thread_rng().gen::<f64>() - 0.5) * 2.0 * self.jitter;
            base * factor
        } else {
            base
        };
        Duration::from_secs_f64(scaled.max(0.0)).min(self.max_delay)
    }

    /// True while attempt `attempt` (0-based) is still within budget.
    pub fn has_attempt(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially_without_jitter() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 1.5);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(150));
        assert_eq!(policy.delay_for(2), Duration::from_millis(225));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(10), 4.0)
            .with_max_delay(Duration::from_secs(15));
        assert_eq!(policy.delay_for(5), Duration::from_secs(15));
    }

    #[test]
    fn jitter_stays_in_band() {
        let policy = RetryPolicy::new(1, Duration::from_millis(100), 2.0).with_jitter(0.5);
        for _ in 0..100 {
            let d = policy.delay_for(0);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn attempt_budget_is_total_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1.0);
        assert!(policy.has_attempt(0));
        assert!(policy.has_attempt(2));
        assert!(!policy.has_attempt(3));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), 1.0);
        assert!(policy.has_attempt(0));
        assert!(!policy.has_attempt(1));
    }
}
