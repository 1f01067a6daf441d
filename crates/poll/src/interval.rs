//! Adaptive interval calculation
//!
//! Maps session inputs and an [`EnvironmentSnapshot`] to the delay before the
//! next background update. The calculation is pure: identical inputs always
//! produce the identical [`NextPoll`].
//!
//! Rules are applied in a fixed order, each one clamped by its own floor or
//! ceiling before the next runs:
//!
//! 1. offline stops polling
//! 2. consecutive errors back off exponentially and short-circuit the rest
//! 3. connection quality
//! 4. polling context
//! 5. user activity recency
//! 6. order volume
//! 7. page visibility
//! 8. global floor

use std::time::Duration;

use tracing::trace;

use crate::config::{EngineConfig, PollContext};
use crate::environment::{ConnectionQuality, EnvironmentSnapshot};

const RECENT_ACTIVITY: Duration = Duration::from_millis(5_000);
const INACTIVE_AFTER: Duration = Duration::from_millis(30_000);

/// Outcome of an interval calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPoll {
    /// Poll again after this delay
    After(Duration),
    /// Do not arm a timer; wait for an external trigger
    Stop,
}

impl NextPoll {
    /// Delay, if polling continues.
    #[must_use]
    pub const fn delay(self) -> Option<Duration> {
        match self {
            Self::After(delay) => Some(delay),
            Self::Stop => None,
        }
    }
}

/// Session-side inputs of the calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalInput {
    /// Configured base interval
    pub base: Duration,
    /// Orders currently shown
    pub order_count: usize,
    /// Whether any order is still active
    pub has_active_orders: bool,
    /// Consecutive failed attempts
    pub consecutive_errors: u32,
    /// Effective polling context
    pub context: PollContext,
}

/// Pure interval calculator.
#[derive(Debug, Clone, Copy)]
pub struct IntervalCalculator {
    min_interval: f64,
    max_error_interval: f64,
    error_backoff_base: f64,
    error_backoff_cap: f64,
}

impl Default for IntervalCalculator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl IntervalCalculator {
    /// Build a calculator from engine tuning.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_interval: config.min_interval().as_millis() as f64,
            max_error_interval: config.max_error_interval_ms as f64,
            error_backoff_base: config.error_backoff_base,
            error_backoff_cap: config.error_backoff_cap,
        }
    }

    /// Compute the next poll for `key`.
    #[must_use]
    pub fn compute(&self, key: &str, input: &IntervalInput, env: &EnvironmentSnapshot) -> NextPoll {
        let next = self.compute_ms(input, env).map_or(NextPoll::Stop, |ms| {
            NextPoll::After(Duration::from_millis(ms.round() as u64))
        });
        trace!(key, ?next, errors = input.consecutive_errors, quality = %env.quality, "interval computed");
        next
    }

    fn compute_ms(&self, input: &IntervalInput, env: &EnvironmentSnapshot) -> Option<f64> {
        if env.quality == ConnectionQuality::Offline {
            return None;
        }

        let base = input.base.as_millis() as f64;

        if input.consecutive_errors > 0 {
            let growth = self
                .error_backoff_base
                .powi(input.consecutive_errors.min(i32::MAX as u32) as i32)
                .min(self.error_backoff_cap);
            return Some((base * growth).min(self.max_error_interval));
        }

        let mut interval = base;

        interval = match env.quality {
            ConnectionQuality::Poor => ceiling(interval * 2.0, 30_000.0),
            ConnectionQuality::Good => floor(interval * 1.1, 3_000.0),
            ConnectionQuality::Excellent | ConnectionQuality::Offline => interval,
        };

        interval = match input.context {
            PollContext::HighInteraction => floor(interval * 1.5, 8_000.0),
            PollContext::Background => floor(interval * 1.2, 6_000.0),
            PollContext::Critical => floor(interval * 0.8, 2_000.0),
            PollContext::Normal => interval,
        };

        // Recent input: back off so polling doesn't interrupt the user.
        // Long idle: poll more, nobody is being interrupted.
        if env.idle < RECENT_ACTIVITY {
            interval = floor(interval * 1.3, 6_000.0);
        } else if env.idle > INACTIVE_AFTER {
            interval = floor(interval * 0.9, 4_000.0);
        }

        if input.has_active_orders {
            if input.order_count > 10 {
                interval = floor(interval * 0.7, 3_000.0);
            } else if input.order_count > 5 {
                interval = floor(interval * 0.8, 4_000.0);
            } else if input.order_count > 0 {
                interval = floor(interval * 0.9, 5_000.0);
            }
        } else {
            interval = ceiling(interval * 1.2, 15_000.0);
        }

        if !env.visible {
            interval = ceiling(interval * 2.0, 60_000.0);
        }

        Some(interval.max(self.min_interval))
    }
}

fn floor(value: f64, min: f64) -> f64 {
    value.max(min)
}

fn ceiling(value: f64, max: f64) -> f64 {
    value.min(max)
}
