//! Request executor: one guarded fetch cycle plus its retries
//!
//! An attempt is skipped silently when the session already has a request in
//! flight, when the previous request started less than the priority's spacing
//! floor ago, or (for background updates on a degraded connection) by random
//! sampling. Otherwise the request runs under a per-attempt cancellation token
//! that the timeout, a superseding `start` or `stop` can trigger.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delta::TransitionRecord;
use crate::environment::ConnectionQuality;
use crate::error::{ErrorRecord, PollError, Severity};
use crate::event::{AttemptMeta, PollEvent, PollFailure, PollOutcome};
use crate::registry::Shared;
use crate::session::Session;
use crate::transport::{NOT_MODIFIED, PollRequest, PollResponse, TransportError, headers};

/// Why an attempt did not issue a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    InFlight,
    TooSoon,
    Degraded,
}

/// Final result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// The session is gone or was superseded
    Gone,
    Skipped(SkipReason),
    Cancelled,
    NotModified,
    Updated,
    /// Failed again within an already reported episode
    Exhausted,
    Reported,
}

enum Step {
    Done(Attempt),
    Retry(Duration),
}

/// What the executor needs from the session to issue a request.
struct Prepared {
    request: PollRequest,
    attempt_token: CancellationToken,
    timeout: Duration,
}

impl Shared {
    /// Run one guarded attempt for the session `key` of generation `id`,
    /// retrying with backoff until it succeeds or the budget is spent.
    pub(crate) async fn execute(
        self: &Arc<Self>,
        key: &str,
        id: u64,
        session_token: &CancellationToken,
        background: bool,
    ) -> Attempt {
        let mut retry = false;
        loop {
            match self.attempt(key, id, background, retry).await {
                Step::Done(attempt) => {
                    debug!(key, ?attempt, background, "attempt finished");
                    return attempt;
                }
                Step::Retry(delay) => {
                    tokio::select! {
                        () = session_token.cancelled() => return Attempt::Cancelled,
                        () = sleep(delay) => {}
                    }
                    retry = true;
                }
            }
        }
    }

    async fn attempt(self: &Arc<Self>, key: &str, id: u64, background: bool, retry: bool) -> Step {
        let prepared = match self.prepare(key, id, background, retry) {
            Ok(prepared) => prepared,
            Err(attempt) => return Step::Done(attempt),
        };
        let Prepared {
            request,
            attempt_token,
            timeout,
        } = prepared;

        let response = tokio::select! {
            biased;
            () = attempt_token.cancelled() => None,
            () = sleep(timeout) => {
                debug!(key, ?timeout, "request timed out");
                attempt_token.cancel();
                None
            }
            result = self.transport.send(request) => Some(result),
        };

        self.settle(key, id, background, response)
    }

    /// Apply the guards and mark the session in flight.
    fn prepare(&self, key: &str, id: u64, background: bool, retry: bool) -> Result<Prepared, Attempt> {
        let quality = self.environment.quality();
        let mut table = self.table.lock();
        let session = table.current_mut(key, id).ok_or(Attempt::Gone)?;

        if session.in_flight {
            debug!(key, "skipping: request already in flight");
            return Err(Attempt::Skipped(SkipReason::InFlight));
        }

        let now = Instant::now();
        let spacing = self.config.spacing.for_priority(session.options.priority);
        if let Some(last) = session.last_request_at
            && now.saturating_duration_since(last) < spacing
        {
            debug!(key, ?spacing, "skipping: too soon after previous request");
            return Err(Attempt::Skipped(SkipReason::TooSoon));
        }

        if background
            && !retry
            && session.options.graceful_degradation
            && quality.is_degraded()
            && fastrand::f64() < self.config.degraded_skip_probability
        {
            debug!(key, %quality, "skipping background update on degraded connection");
            return Err(Attempt::Skipped(SkipReason::Degraded));
        }

        let mut request_headers = vec![
            (headers::ACCEPT.to_string(), headers::APPLICATION_JSON.to_string()),
            (headers::CACHE_CONTROL.to_string(), headers::NO_CACHE.to_string()),
        ];
        if let Some(validator) = &session.validator {
            request_headers.push((headers::IF_NONE_MATCH.to_string(), validator.clone()));
        }
        if let Some(token) = &self.config.anti_forgery {
            request_headers.push((token.header.clone(), token.token.clone()));
        }

        let attempt_token = session.token.child_token();
        session.in_flight = true;
        session.last_request_at = Some(now);
        session.request_count += 1;

        Ok(Prepared {
            request: PollRequest {
                key: key.to_string(),
                endpoint: session.endpoint.clone(),
                headers: request_headers,
                signal: attempt_token.clone(),
            },
            attempt_token,
            timeout: self.config.timeout(quality == ConnectionQuality::Poor),
        })
    }

    /// Classify the response and update the session.
    fn settle(
        self: &Arc<Self>,
        key: &str,
        id: u64,
        background: bool,
        response: Option<Result<PollResponse, TransportError>>,
    ) -> Step {
        let quality = self.environment.quality();
        let mut table = self.table.lock();
        let Some(session) = table.current_mut(key, id) else {
            return Step::Done(Attempt::Gone);
        };
        session.in_flight = false;

        let Some(result) = response else {
            return Step::Done(Attempt::Cancelled);
        };

        let error = match result {
            Ok(response) if response.status == NOT_MODIFIED => {
                session.consecutive_errors = 0;
                session.error = None;
                let meta = meta(session, background);
                session.emit(PollEvent::Attempt {
                    key: key.to_string(),
                    outcome: PollOutcome::NotModified,
                    meta,
                });
                return Step::Done(Attempt::NotModified);
            }
            Ok(response) if response.is_success() => {
                match serde_json::from_slice::<Value>(&response.body) {
                    Ok(payload) => {
                        if response.validator.is_some() {
                            session.validator = response.validator;
                        }
                        self.deliver(session, background, payload);
                        return Step::Done(Attempt::Updated);
                    }
                    Err(err) => PollError::from(err),
                }
            }
            Ok(response) => PollError::Status {
                status: response.status,
            },
            Err(err) => PollError::network(err),
        };

        self.fail(session, background, quality, error)
    }

    fn deliver(self: &Arc<Self>, session: &mut Session, background: bool, payload: Value) {
        if let Some(previous) = session.last_payload.take() {
            let delta = self.detector.diff(&session.key, &previous, &payload);
            if delta.has_changes {
                let record = TransitionRecord {
                    key: session.key.clone(),
                    previous,
                    next: payload.clone(),
                    delta,
                    started_at: Instant::now(),
                };
                session.transition = Some(record.clone());
                self.schedule_transition_clear(&session.key, session.id, record.started_at);
                session.emit(PollEvent::Transition(record));
            }
        }

        session.last_payload = Some(payload.clone());
        session.consecutive_errors = 0;
        session.error = None;

        let meta = meta(session, background);
        session.emit(PollEvent::Attempt {
            key: session.key.clone(),
            outcome: PollOutcome::Success(payload),
            meta,
        });
    }

    fn fail(
        &self,
        session: &mut Session,
        background: bool,
        quality: ConnectionQuality,
        error: PollError,
    ) -> Step {
        let options = &session.options;
        let spacing = self.config.spacing.for_priority(options.priority);

        if session.consecutive_errors < options.max_retries {
            let attempt = session.consecutive_errors;
            session.consecutive_errors += 1;
            let delay = self.backoff.delay(options.retry_delay, attempt).max(spacing);
            warn!(
                key = %session.key,
                %error,
                retry = session.consecutive_errors,
                max_retries = options.max_retries,
                ?delay,
                "poll failed, retrying"
            );
            return Step::Retry(delay);
        }

        if session.error.is_some() {
            debug!(key = %session.key, %error, "poll failed again, error already reported");
            return Step::Done(Attempt::Exhausted);
        }

        let severity = if quality == ConnectionQuality::Offline {
            Severity::Low
        } else {
            Severity::Medium
        };
        warn!(
            key = %session.key,
            %error,
            %severity,
            attempts = session.consecutive_errors + 1,
            "poll failed, retries exhausted"
        );

        session.error = Some(ErrorRecord {
            key: session.key.clone(),
            message: error.to_string(),
            severity,
            recoverable: true,
            recorded_at: Instant::now(),
        });

        let meta = meta(session, background);
        let surface = !background || meta.consecutive_errors >= self.config.surface_error_threshold;
        session.emit(PollEvent::Attempt {
            key: session.key.clone(),
            outcome: PollOutcome::Failure(PollFailure {
                error,
                severity,
                surface,
            }),
            meta,
        });
        Step::Done(Attempt::Reported)
    }

    fn schedule_transition_clear(self: &Arc<Self>, key: &str, id: u64, started_at: Instant) {
        let shared = Arc::clone(self);
        let key = key.to_string();
        let window = self.config.transition_window();
        tokio::spawn(async move {
            sleep(window).await;
            let mut table = shared.table.lock();
            if let Some(session) = table.current_mut(&key, id)
                && session
                    .transition
                    .as_ref()
                    .is_some_and(|record| record.started_at == started_at)
            {
                session.transition = None;
                info!(key, "transition finished");
            }
        });
    }
}

fn meta(session: &Session, background: bool) -> AttemptMeta {
    AttemptMeta {
        is_background: background,
        request_count: session.request_count,
        consecutive_errors: session.consecutive_errors,
    }
}
