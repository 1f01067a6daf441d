//! Events delivered to session subscribers

use serde_json::Value;

use crate::delta::TransitionRecord;
use crate::error::{PollError, Severity};

/// Context of the attempt that produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptMeta {
    /// The attempt was a background update rather than an initial or explicit poll
    pub is_background: bool,
    /// Requests issued by the session so far, this one included
    pub request_count: u64,
    /// Consecutive failed attempts at delivery time
    pub consecutive_errors: u32,
}

/// A failure whose retry budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    /// Last attempt's error
    pub error: PollError,
    /// Presentation severity
    pub severity: Severity,
    /// Whether a view should show it now; background blips stay hidden
    /// until the error count reaches the surfacing threshold
    pub surface: bool,
}

/// Result of a completed poll attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The server reported no change since the stored validator
    NotModified,
    /// Fresh payload
    Success(Value),
    /// Retries are exhausted
    Failure(PollFailure),
}

/// Event on a session's subscription.
///
/// For one attempt a [`PollEvent::Transition`] always precedes the
/// [`PollOutcome::Success`] carrying the new payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// A poll attempt finished
    Attempt {
        /// Session key
        key: String,
        /// What happened
        outcome: PollOutcome,
        /// Attempt context
        meta: AttemptMeta,
    },
    /// The payload changed since the previous success
    Transition(TransitionRecord),
}

impl PollEvent {
    /// Session key of the event.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Attempt { key, .. } => key,
            Self::Transition(record) => &record.key,
        }
    }

    /// Payload of a successful attempt.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        match self {
            Self::Attempt {
                outcome: PollOutcome::Success(payload),
                ..
            } => Some(payload),
            _ => None,
        }
    }

    /// Failure of an exhausted attempt.
    #[must_use]
    pub const fn failure(&self) -> Option<&PollFailure> {
        match self {
            Self::Attempt {
                outcome: PollOutcome::Failure(failure),
                ..
            } => Some(failure),
            _ => None,
        }
    }

    /// Attempt metadata, for attempt events.
    #[must_use]
    pub const fn meta(&self) -> Option<&AttemptMeta> {
        match self {
            Self::Attempt { meta, .. } => Some(meta),
            Self::Transition(_) => None,
        }
    }
}
