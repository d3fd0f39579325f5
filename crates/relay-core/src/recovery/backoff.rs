//! Exponential backoff with additive jitter

use rand::Rng;
use std::time::Duration;

/// `min(base * 2^attempt, max) + uniform(0, jitter)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter,
        }
    }

    /// Deterministic part of the delay for a 0-indexed attempt
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay including a fresh jitter sample
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_secs = rand::thread_rng().gen_range(0.0..self.jitter.as_secs_f64());
        base + Duration::from_secs_f64(jitter_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_doubles_then_caps() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(30), Duration::ZERO);
        let delays: Vec<u64> = (0..6).map(|k| backoff.base_delay_for_attempt(k).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(30), Duration::ZERO);
        assert_eq!(backoff.base_delay_for_attempt(200), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_ceiling() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(30), Duration::from_secs(1));
        for _ in 0..200 {
            let delay = backoff.delay_for_attempt(1);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay < Duration::from_secs(5));
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), Duration::ZERO);
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(400));
    }
}
