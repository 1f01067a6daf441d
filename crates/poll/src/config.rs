//! Engine-wide tuning and per-session polling options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delta::DeltaConfig;
use crate::error::{ConfigError, ConfigResult};

/// Scheduling priority of a session; drives the minimum request spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Customer-facing order tracking
    High,
    /// Staff dashboards
    #[default]
    Normal,
    /// Reporting and other tolerant views
    Low,
}

/// What the consumer is doing while the session polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollContext {
    /// No adjustment
    #[default]
    Normal,
    /// The user is actively working in the view; poll less aggressively
    HighInteraction,
    /// The view is not in focus
    Background,
    /// Freshness matters more than load
    Critical,
}

/// Minimum spacing between two request starts, per priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingConfig {
    /// Spacing for [`Priority::High`]
    pub high_ms: u64,
    /// Spacing for [`Priority::Normal`]
    pub normal_ms: u64,
    /// Spacing for [`Priority::Low`]
    pub low_ms: u64,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            high_ms: 500,
            normal_ms: 1_000,
            low_ms: 2_000,
        }
    }
}

impl SpacingConfig {
    /// Spacing floor for a priority tier.
    #[must_use]
    pub const fn for_priority(&self, priority: Priority) -> Duration {
        Duration::from_millis(match priority {
            Priority::High => self.high_ms,
            Priority::Normal => self.normal_ms,
            Priority::Low => self.low_ms,
        })
    }
}

/// Anti-forgery token attached to every request when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiForgeryToken {
    /// Header name, e.g. `X-CSRF-TOKEN`
    pub header: String,
    /// Token value
    pub token: String,
}

/// Engine-wide tuning shared by every session of a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Final floor of every computed interval
    pub min_interval_ms: u64,
    /// Ceiling of the error backoff interval
    pub max_error_interval_ms: u64,
    /// Base of the interval error backoff (`base^errors`)
    pub error_backoff_base: f64,
    /// Cap of the interval error backoff multiplier
    pub error_backoff_cap: f64,
    /// Minimum request spacing per priority
    pub spacing: SpacingConfig,
    /// Request timeout on a healthy connection
    pub request_timeout_ms: u64,
    /// Request timeout on a poor connection
    pub degraded_timeout_ms: u64,
    /// Growth factor of the retry delay
    pub retry_backoff_factor: f64,
    /// Ceiling of a single retry delay, jitter included
    pub max_retry_delay_ms: u64,
    /// Upper bound of the random jitter added to each retry delay
    pub retry_jitter_ms: u64,
    /// Share of background updates skipped under graceful degradation
    pub degraded_skip_probability: f64,
    /// Age after which a stored error is reported as stale
    pub error_stale_after_ms: u64,
    /// Lifetime of a transition record
    pub transition_window_ms: u64,
    /// Background failures surface once the error count reaches this value
    pub surface_error_threshold: u32,
    /// Interaction intensity at which an unpinned session counts as high interaction
    pub high_interaction_intensity: u32,
    /// Field names used by the delta detector
    pub delta: DeltaConfig,
    /// Optional anti-forgery header
    pub anti_forgery: Option<AntiForgeryToken>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2_000,
            max_error_interval_ms: 60_000,
            error_backoff_base: 2.0,
            error_backoff_cap: 8.0,
            spacing: SpacingConfig::default(),
            request_timeout_ms: 10_000,
            degraded_timeout_ms: 15_000,
            retry_backoff_factor: 2.0,
            max_retry_delay_ms: 30_000,
            retry_jitter_ms: 1_000,
            degraded_skip_probability: 0.3,
            error_stale_after_ms: 30_000,
            transition_window_ms: 300,
            surface_error_threshold: 2,
            high_interaction_intensity: 5,
            delta: DeltaConfig::default(),
            anti_forgery: None,
        }
    }
}

impl EngineConfig {
    /// Validate every tunable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_interval_ms == 0 {
            return Err(ConfigError::new("min_interval_ms", "must be positive"));
        }
        if self.max_error_interval_ms < self.min_interval_ms {
            return Err(ConfigError::new(
                "max_error_interval_ms",
                "must not be below min_interval_ms",
            ));
        }
        if !is_growth_factor(self.error_backoff_base) {
            return Err(ConfigError::new("error_backoff_base", "must be >= 1.0"));
        }
        if !is_growth_factor(self.error_backoff_cap) {
            return Err(ConfigError::new("error_backoff_cap", "must be >= 1.0"));
        }
        if !is_growth_factor(self.retry_backoff_factor) {
            return Err(ConfigError::new("retry_backoff_factor", "must be >= 1.0"));
        }
        if self.request_timeout_ms == 0 || self.degraded_timeout_ms == 0 {
            return Err(ConfigError::new("request_timeout_ms", "timeouts must be positive"));
        }
        if !(0.0..=1.0).contains(&self.degraded_skip_probability) {
            return Err(ConfigError::new(
                "degraded_skip_probability",
                format!("must be within 0.0..=1.0, got {}", self.degraded_skip_probability),
            ));
        }
        if let Some(token) = &self.anti_forgery
            && token.header.trim().is_empty()
        {
            return Err(ConfigError::new("anti_forgery", "header name cannot be empty"));
        }
        self.delta.validate()
    }

    /// Final interval floor.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Request timeout for the current connection quality.
    #[must_use]
    pub const fn timeout(&self, degraded: bool) -> Duration {
        Duration::from_millis(if degraded {
            self.degraded_timeout_ms
        } else {
            self.request_timeout_ms
        })
    }

    /// Staleness window of stored errors.
    #[must_use]
    pub const fn error_stale_after(&self) -> Duration {
        Duration::from_millis(self.error_stale_after_ms)
    }

    /// Lifetime of transition records.
    #[must_use]
    pub const fn transition_window(&self) -> Duration {
        Duration::from_millis(self.transition_window_ms)
    }
}

/// Per-session polling options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollOptions {
    /// Base interval between background updates
    #[serde(with = "millis")]
    pub interval: Duration,
    /// Retries per failure episode before the error is surfaced
    pub max_retries: u32,
    /// Base delay of the first retry
    #[serde(with = "millis")]
    pub retry_delay: Duration,
    /// Number of orders the view currently shows
    pub order_count: usize,
    /// Whether any of those orders is still moving through the queue
    pub has_active_orders: bool,
    /// Scheduling priority
    pub priority: Priority,
    /// Treat recurring ticks as background updates
    pub background_updates: bool,
    /// Shed background load on a degraded connection
    pub graceful_degradation: bool,
    /// Pinned context; derived from the environment when `None`
    pub context: Option<PollContext>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
            order_count: 0,
            has_active_orders: false,
            priority: Priority::Normal,
            background_updates: true,
            graceful_degradation: true,
            context: None,
        }
    }
}

impl PollOptions {
    /// Options with a specific base interval.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Set the retry budget
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set order volume hints
    #[must_use]
    pub const fn with_orders(mut self, order_count: usize, has_active_orders: bool) -> Self {
        self.order_count = order_count;
        self.has_active_orders = has_active_orders;
        self
    }

    /// Set the priority tier
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Pin the polling context
    #[must_use]
    pub const fn with_context(mut self, context: PollContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Toggle background marking of recurring ticks
    #[must_use]
    pub const fn with_background_updates(mut self, enabled: bool) -> Self {
        self.background_updates = enabled;
        self
    }

    /// Toggle load shedding on degraded connections
    #[must_use]
    pub const fn with_graceful_degradation(mut self, enabled: bool) -> Self {
        self.graceful_degradation = enabled;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::new("interval", "must be positive"));
        }
        if self.retry_delay.is_zero() && self.max_retries > 0 {
            return Err(ConfigError::new(
                "retry_delay",
                "must be positive when retries are enabled",
            ));
        }
        Ok(())
    }

    /// Replace invalid values with defaults so a session can always start.
    #[must_use]
    pub(crate) fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.interval.is_zero() {
            self.interval = defaults.interval;
        }
        if self.retry_delay.is_zero() {
            self.retry_delay = defaults.retry_delay;
        }
        self
    }
}

// NaN fails the comparison and is rejected with it.
fn is_growth_factor(value: f64) -> bool {
    value >= 1.0
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
