//! Retry delay calculation: exponential growth plus additive jitter
//!
//! `delay = retry_delay * factor^attempt + jitter`, capped as a whole.

use std::time::Duration;

use crate::config::EngineConfig;

/// Exponential retry backoff with additive random jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBackoff {
    factor: f64,
    max_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl RetryBackoff {
    /// Build from engine tuning.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            factor: config.retry_backoff_factor,
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            max_jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// Disable jitter, e.g. for reproducible schedules.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Delay before retry number `attempt` (0-indexed), without jitter.
    #[must_use]
    pub fn base_delay(&self, retry_delay: Duration, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let millis = retry_delay.as_millis() as f64 * self.factor.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `attempt` (0-indexed), jitter included.
    #[must_use]
    pub fn delay(&self, retry_delay: Duration, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(fastrand::u64(0..=jitter_ms))
        };
        (self.base_delay(retry_delay, attempt) + jitter).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn grows_strictly_for_first_errors() {
        let backoff = RetryBackoff::default();
        let retry_delay = Duration::from_millis(2_000);

        let delays: Vec<_> = (0..3).map(|attempt| backoff.base_delay(retry_delay, attempt)).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(2_000),
                Duration::from_millis(4_000),
                Duration::from_millis(8_000),
            ]
        );
        assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn caps_at_thirty_seconds() {
        let backoff = RetryBackoff::default();
        assert_eq!(
            backoff.base_delay(Duration::from_millis(2_000), 10),
            Duration::from_millis(30_000)
        );
        assert_eq!(
            backoff.delay(Duration::from_millis(2_000), 10),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn without_jitter_is_exact() {
        let backoff = RetryBackoff::default().without_jitter();
        assert_eq!(
            backoff.delay(Duration::from_millis(1_000), 1),
            Duration::from_millis(2_000)
        );
    }

    proptest! {
        #[test]
        fn jitter_stays_within_bounds(retry_ms in 1u64..10_000, attempt in 0u32..8) {
            let backoff = RetryBackoff::default();
            let retry_delay = Duration::from_millis(retry_ms);
            let base = backoff.base_delay(retry_delay, attempt);
            let delay = backoff.delay(retry_delay, attempt);

            prop_assert!(delay >= base);
            prop_assert!(delay <= (base + Duration::from_millis(1_000)).min(Duration::from_millis(30_000)));
        }
    }
}
