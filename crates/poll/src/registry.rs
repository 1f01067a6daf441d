//! Polling session registry
//!
//! [`PollingRegistry`] owns every session, keyed by a caller-chosen string.
//! Each session is driven by one Tokio task that runs the initial request,
//! asks the [`IntervalCalculator`] for the next delay and then waits for
//! whichever comes first: the timer, an explicit refresh, an environment
//! refresh (visibility or connectivity regained), a retime or cancellation.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use percolate_poll::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = PollingRegistry::new(HttpTransport::new()?);
//! let mut orders = registry.start(
//!     "cashier-orders",
//!     "http://shop.local/api/orders/pending",
//!     PollOptions::every(Duration::from_secs(5)).with_orders(3, true),
//! );
//!
//! while let Some(event) = orders.next().await {
//!     if let Some(payload) = event.payload() {
//!         println!("{payload}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::RetryBackoff;
use crate::config::{EngineConfig, PollContext, PollOptions};
use crate::delta::{DeltaDetector, TransitionRecord};
use crate::environment::{EnvironmentMonitor, EnvironmentSnapshot};
use crate::error::{ConfigResult, ErrorView};
use crate::event::PollEvent;
use crate::interval::{IntervalCalculator, IntervalInput, NextPoll};
use crate::session::{Session, SessionSnapshot, SessionTable, Signals};
use crate::transport::{Endpoint, Transport};

/// State shared by the registry handle, its subscriptions and session drivers.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) calculator: IntervalCalculator,
    pub(crate) backoff: RetryBackoff,
    pub(crate) detector: DeltaDetector,
    pub(crate) environment: EnvironmentMonitor,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) table: Mutex<SessionTable>,
}

/// Owns polling sessions and exposes start, stop and query operations.
///
/// Cheap to clone; clones share the same sessions. No operation fails toward
/// the caller: invalid options are replaced with defaults and logged, unknown
/// keys are ignored.
#[derive(Clone)]
pub struct PollingRegistry {
    shared: Arc<Shared>,
}

impl fmt::Debug for PollingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingRegistry")
            .field("config", &self.shared.config)
            .field("active_keys", &self.active_keys())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PollingRegistry`].
pub struct PollingRegistryBuilder {
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    environment: Option<EnvironmentMonitor>,
    backoff: Option<RetryBackoff>,
}

impl fmt::Debug for PollingRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingRegistryBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PollingRegistryBuilder {
    /// Engine tuning.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing environment monitor.
    #[must_use]
    pub fn environment(mut self, environment: EnvironmentMonitor) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Override the retry backoff derived from the config.
    #[must_use]
    pub const fn backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Validate the configuration and build the registry.
    pub fn build(self) -> ConfigResult<PollingRegistry> {
        self.config.validate()?;
        let config = self.config;
        Ok(PollingRegistry {
            shared: Arc::new(Shared {
                calculator: IntervalCalculator::new(&config),
                backoff: self.backoff.unwrap_or_else(|| RetryBackoff::new(&config)),
                detector: DeltaDetector::new(config.delta.clone()),
                environment: self.environment.unwrap_or_default(),
                transport: self.transport,
                table: Mutex::new(SessionTable::default()),
                config,
            }),
        })
    }
}

/// A transition that is still animating.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTransition {
    /// The stored record
    pub record: TransitionRecord,
    /// Elapsed share of the transition window, within `[0, 1]`
    pub progress: f64,
}

impl PollingRegistry {
    /// Registry with default tuning.
    pub fn new(transport: impl Transport) -> Self {
        let config = EngineConfig::default();
        Self {
            shared: Arc::new(Shared {
                calculator: IntervalCalculator::new(&config),
                backoff: RetryBackoff::new(&config),
                detector: DeltaDetector::new(config.delta.clone()),
                environment: EnvironmentMonitor::new(),
                transport: Arc::new(transport),
                table: Mutex::new(SessionTable::default()),
                config,
            }),
        }
    }

    /// Start configuring a registry around `transport`.
    pub fn builder(transport: impl Transport) -> PollingRegistryBuilder {
        PollingRegistryBuilder {
            transport: Arc::new(transport),
            config: EngineConfig::default(),
            environment: None,
            backoff: None,
        }
    }

    /// Engine tuning in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Environment monitor feeding this registry.
    #[must_use]
    pub fn environment(&self) -> &EnvironmentMonitor {
        &self.shared.environment
    }

    /// Start polling `endpoint` under `key`, replacing any session already
    /// registered for that key.
    ///
    /// The replaced session is cancelled, together with its in-flight request,
    /// before the new session issues its first request. The returned
    /// [`Subscription`] receives the session's events; dropping it stops the
    /// session.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        &self,
        key: impl Into<String>,
        endpoint: impl Into<Endpoint>,
        options: PollOptions,
    ) -> Subscription {
        let key = key.into();
        let endpoint = endpoint.into();
        if let Err(err) = options.validate() {
            warn!(key, %err, "invalid poll options, falling back to defaults");
        }
        let options = options.sanitized();
        let (events, receiver) = mpsc::unbounded_channel();

        let (id, token, signals) = {
            let mut table = self.shared.table.lock();
            let id = table.next_id();
            let session = Session::new(id, key.clone(), endpoint, options, events);
            let token = session.token.clone();
            let signals = session.signals.clone();
            if let Some(previous) = table.insert(session) {
                previous.cancel();
                debug!(key, previous = previous.id, "superseded existing session");
            }
            (id, token, signals)
        };

        info!(key, id, "polling started");
        tokio::spawn(drive(
            Arc::clone(&self.shared),
            key.clone(),
            id,
            token.clone(),
            signals,
        ));

        Subscription {
            key,
            id,
            token,
            events: receiver,
            registry: Arc::downgrade(&self.shared),
        }
    }

    /// Stop the session under `key`, aborting its in-flight request and
    /// purging its error and transition records.
    ///
    /// Returns whether a session was stopped.
    pub fn stop(&self, key: &str) -> bool {
        self.shared.stop(key, None)
    }

    /// Stop every session.
    pub fn stop_all(&self) {
        let sessions = self.shared.table.lock().drain();
        for session in &sessions {
            session.cancel();
        }
        if !sessions.is_empty() {
            info!(count = sessions.len(), "stopped all polling sessions");
        }
    }

    /// Presentation view of the stored error for `key`.
    #[must_use]
    pub fn error(&self, key: &str) -> Option<ErrorView> {
        let table = self.shared.table.lock();
        let record = table.get(key)?.error.as_ref()?;
        Some(record.view(Instant::now(), self.shared.config.error_stale_after()))
    }

    /// Poll `key` now instead of waiting for its timer.
    ///
    /// Returns whether the key has a session.
    pub fn refresh(&self, key: &str) -> bool {
        let table = self.shared.table.lock();
        table.get(key).is_some_and(|session| {
            session.signals.refresh.notify_one();
            true
        })
    }

    /// Poll every session now.
    pub fn refresh_all(&self) {
        let table = self.shared.table.lock();
        for session in table.iter() {
            session.signals.refresh.notify_one();
        }
    }

    /// Change the base interval of a running session without restarting it.
    ///
    /// A zero interval is ignored.
    pub fn set_base_interval(&self, key: &str, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!(key, "ignoring zero base interval");
            return false;
        }
        self.retime(key, |options| options.interval = interval)
    }

    /// Update the order volume hints of a running session.
    pub fn update_orders(&self, key: &str, order_count: usize, has_active_orders: bool) -> bool {
        self.retime(key, |options| {
            options.order_count = order_count;
            options.has_active_orders = has_active_orders;
        })
    }

    fn retime(&self, key: &str, update: impl FnOnce(&mut PollOptions)) -> bool {
        let mut table = self.shared.table.lock();
        let Some(session) = table.get_mut(key) else {
            return false;
        };
        update(&mut session.options);
        session.signals.retime.notify_one();
        true
    }

    /// Whether a session is registered under `key`.
    #[must_use]
    pub fn is_polling(&self, key: &str) -> bool {
        self.shared.table.lock().get(key).is_some()
    }

    /// Keys of every registered session, sorted.
    #[must_use]
    pub fn active_keys(&self) -> Vec<String> {
        self.shared.table.lock().keys()
    }

    /// Read-only view of the session under `key`.
    #[must_use]
    pub fn snapshot(&self, key: &str) -> Option<SessionSnapshot> {
        self.shared.table.lock().get(key).map(Session::snapshot)
    }

    /// The transition of `key`, while its window has not elapsed.
    #[must_use]
    pub fn transition(&self, key: &str) -> Option<ActiveTransition> {
        let table = self.shared.table.lock();
        let record = table.get(key)?.transition.as_ref()?;
        let now = Instant::now();
        let window = self.shared.config.transition_window();
        if record.is_expired(now, window) {
            return None;
        }
        Some(ActiveTransition {
            record: record.clone(),
            progress: record.progress(now, window),
        })
    }
}

impl Shared {
    fn stop(&self, key: &str, id: Option<u64>) -> bool {
        let removed = self.table.lock().remove(key, id);
        removed.is_some_and(|session| {
            session.cancel();
            info!(key, id = session.id, "polling stopped");
            true
        })
    }

    /// Compute and store the next poll of the current session generation.
    ///
    /// Returns `None` once the session is gone, along with whether the next
    /// timer tick is a background update.
    fn next_poll(&self, key: &str, id: u64) -> Option<(NextPoll, bool)> {
        let env = self.environment.snapshot();
        let mut table = self.table.lock();
        let session = table.current_mut(key, id)?;
        let options = &session.options;
        let input = IntervalInput {
            base: options.interval,
            order_count: options.order_count,
            has_active_orders: options.has_active_orders,
            consecutive_errors: session.consecutive_errors,
            context: options
                .context
                .unwrap_or_else(|| self.derive_context(&env)),
        };
        let next = self.calculator.compute(key, &input, &env);
        session.current_interval = next.delay();
        Some((next, options.background_updates))
    }

    const fn derive_context(&self, env: &EnvironmentSnapshot) -> PollContext {
        if !env.visible {
            PollContext::Background
        } else if env.interaction_intensity >= self.config.high_interaction_intensity {
            PollContext::HighInteraction
        } else {
            PollContext::Normal
        }
    }
}

/// What woke a waiting session driver.
enum Wake {
    Cancelled,
    Tick,
    Refresh,
    Retime,
}

/// Drive one session until it is cancelled or superseded.
async fn drive(
    shared: Arc<Shared>,
    key: String,
    id: u64,
    token: CancellationToken,
    signals: Signals,
) {
    let mut environment = shared.environment.refresh_signal();
    environment.mark_unchanged();

    shared.execute(&key, id, &token, false).await;

    let mut recompute = true;
    let mut armed: Option<(NextPoll, bool)> = None;
    loop {
        if recompute {
            armed = shared.next_poll(&key, id);
        }
        let Some((next, background)) = armed else {
            debug!(key, id, "session gone, driver exiting");
            return;
        };

        let timer = async {
            match next {
                NextPoll::After(delay) => sleep(delay).await,
                NextPoll::Stop => std::future::pending().await,
            }
        };

        let wake = tokio::select! {
            biased;
            () = token.cancelled() => Wake::Cancelled,
            () = signals.refresh.notified() => Wake::Refresh,
            Ok(()) = environment.changed() => Wake::Refresh,
            () = signals.retime.notified() => Wake::Retime,
            () = timer => Wake::Tick,
        };

        recompute = true;
        match wake {
            Wake::Cancelled => return,
            Wake::Tick => {
                debug!(key, background, "timer tick");
                shared.execute(&key, id, &token, background).await;
            }
            Wake::Refresh => {
                debug!(key, "refresh");
                shared.execute(&key, id, &token, false).await;
            }
            Wake::Retime => debug!(key, "retiming"),
        }
    }
}

/// Event stream and cancel handle of one session.
///
/// Dropping the subscription stops the session, unless the key has since
/// been taken over by a newer session.
///
/// Events are queued on an unbounded channel. A subscription that is kept
/// alive but never read keeps buffering one event per completed attempt, so
/// callers that lose interest should drop or [`cancel`](Self::cancel) it.
#[must_use = "dropping a subscription stops its session"]
#[derive(Debug)]
pub struct Subscription {
    key: String,
    id: u64,
    token: CancellationToken,
    events: mpsc::UnboundedReceiver<PollEvent>,
    registry: Weak<Shared>,
}

impl Subscription {
    /// Session key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next event; `None` once the session has been stopped or superseded
    /// and every pending event was received.
    pub async fn next(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }

    /// Next event, if one is ready.
    pub fn try_next(&mut self) -> Option<PollEvent> {
        self.events.try_recv().ok()
    }

    /// Whether the session is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop the session.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.stop(&self.key, Some(self.id));
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
