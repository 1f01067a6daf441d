//! Error types for polling operations
//!
//! Three layers of failure exist in the engine:
//!
//! - [`PollError`]: why a single attempt failed (network, status, body)
//! - [`ErrorRecord`]: a stored, exhausted failure episode for one session key
//! - [`ErrorView`]: the presentation-ready projection returned by
//!   [`PollingRegistry::error`](crate::PollingRegistry::error)

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Failure of a single poll attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// The request never produced a response
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a status that is neither 2xx nor 304
    #[error("server responded with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The response body was not valid JSON
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl PollError {
    /// Create a network error from anything displayable.
    pub fn network(message: impl fmt::Display) -> Self {
        Self::Network(message.to_string())
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PollError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid config `{field}`: {reason}")]
pub struct ConfigError {
    /// Offending field
    pub field: &'static str,
    /// What is wrong with it
    pub reason: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// How loudly an exhausted failure should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected while offline
    Low,
    /// Connectivity looked fine, the server still failed
    Medium,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
        }
    }
}

/// Stored failure for a session whose retry budget ran out.
///
/// Lives in the session's table entry until the next success or `stop`.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Session key
    pub key: String,
    /// Failure message
    pub message: String,
    /// Presentation severity
    pub severity: Severity,
    /// Whether polling keeps trying on its own
    pub recoverable: bool,
    /// When the episode was recorded
    pub recorded_at: Instant,
}

impl ErrorRecord {
    /// Project the record into a view, judging staleness against `now`.
    #[must_use]
    pub fn view(&self, now: Instant, stale_after: Duration) -> ErrorView {
        let suggestion = if self.recoverable {
            "Updates will resume automatically once the connection recovers."
        } else {
            "Reload the page or contact support if the problem persists."
        };

        ErrorView {
            message: self.message.clone(),
            severity: self.severity,
            recoverable: self.recoverable,
            stale: now.saturating_duration_since(self.recorded_at) > stale_after,
            suggestion: suggestion.to_string(),
        }
    }
}

/// Presentation-ready error for a session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    /// Failure message
    pub message: String,
    /// Presentation severity
    pub severity: Severity,
    /// Whether polling keeps trying on its own
    pub recoverable: bool,
    /// The error is older than the staleness window
    pub stale: bool,
    /// Human hint conditioned on recoverability
    pub suggestion: String,
}
