//! # Percolate Poll
//!
//! Adaptive client-side polling for order queues.
//!
//! Sessions fetch a JSON endpoint repeatedly under a caller-chosen key. The
//! delay between background updates adapts to connection quality, user
//! activity, page visibility, order volume and error history; failed requests
//! are retried with jittered exponential backoff; successive payloads are
//! diffed so a view can animate what changed.
//!
//! ## Key Components
//!
//! - [`PollingRegistry`]: owns sessions: start, stop, refresh, query
//! - [`Subscription`]: per-session event stream and cancel handle
//! - [`IntervalCalculator`]: pure mapping from inputs to the next delay
//! - [`EnvironmentMonitor`]: activity, visibility and network signals
//! - [`DeltaDetector`]: added, removed and updated items between payloads
//! - [`Transport`]: the HTTP seam, with [`HttpTransport`] over `reqwest`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use percolate_poll::prelude::*;
//!
//! let registry = PollingRegistry::new(HttpTransport::new()?);
//! let mut orders = registry.start(
//!     "barista-queue",
//!     "http://shop.local/api/orders/active",
//!     PollOptions::every(Duration::from_secs(3)).with_priority(Priority::High),
//! );
//!
//! while let Some(event) = orders.next().await {
//!     match event {
//!         PollEvent::Transition(record) => animate(&record.delta),
//!         PollEvent::Attempt { outcome: PollOutcome::Success(payload), .. } => render(&payload),
//!         _ => {}
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Retry delay calculation.
pub mod backoff;
/// Engine tuning and per-session options.
pub mod config;
/// Payload diffing and transition records.
pub mod delta;
/// Activity, visibility and connection tracking.
pub mod environment;
/// Error types and stored error records.
pub mod error;
/// Events delivered to subscribers.
pub mod event;
/// Adaptive interval calculation.
pub mod interval;
/// Session registry and drivers.
pub mod registry;
/// HTTP seam.
pub mod transport;

mod executor;
mod session;

pub use backoff::RetryBackoff;
pub use config::{AntiForgeryToken, EngineConfig, PollContext, PollOptions, Priority, SpacingConfig};
pub use delta::{Delta, DeltaConfig, DeltaDetector, TransitionRecord};
pub use environment::{
    ActivityKind, ConnectionQuality, EffectiveType, EnvironmentMonitor, EnvironmentSnapshot,
    EnvironmentState, NetworkInfo,
};
pub use error::{ConfigError, ConfigResult, ErrorRecord, ErrorView, PollError, Severity};
pub use event::{AttemptMeta, PollEvent, PollFailure, PollOutcome};
pub use interval::{IntervalCalculator, IntervalInput, NextPoll};
pub use registry::{ActiveTransition, PollingRegistry, PollingRegistryBuilder, Subscription};
pub use session::SessionSnapshot;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{Endpoint, Method, PollRequest, PollResponse, Transport, TransportError};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::{
        ActivityKind, ConnectionQuality, EngineConfig, EnvironmentMonitor, ErrorView, PollContext,
        PollError, PollEvent, PollOptions, PollOutcome, PollingRegistry, Priority, Subscription,
        Transport,
    };

    #[cfg(feature = "http")]
    pub use crate::HttpTransport;
}
