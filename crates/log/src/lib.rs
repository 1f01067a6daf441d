//! # Percolate Log
//!
//! Logging setup shared by percolate binaries.
//!
//! ## Quick Start
//!
//! ```rust
//! fn main() -> Result<(), percolate_log::LogError> {
//!     let _guard = percolate_log::auto_init()?;
//!
//!     tracing::info!(key = "cashier-orders", "polling started");
//!     Ok(())
//! }
//! ```
//!
//! The filter comes from `PERCOLATE_LOG` or `RUST_LOG`, the output format from
//! `PERCOLATE_LOG_FORMAT`. Without either, debug builds log pretty output at
//! `debug` and release builds log JSON at `info`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, FORMAT_ENV, Format, LOG_ENV, Writer};
pub use error::{LogError, LogResult};

/// Auto-detect and initialize the best logging configuration
///
/// Idempotent: when a global subscriber is already installed this returns a
/// guard that reports [`installed`](LoggerGuard::installed) as `false`.
///
/// # Errors
///
/// Returns error if the configured filter cannot be parsed.
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var(LOG_ENV).is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        let mut config = Config::development();
        config.apply_env(|name| std::env::var(name).ok());
        init_with(config)
    } else {
        let mut config = Config::production();
        config.apply_env(|name| std::env::var(name).ok());
        init_with(config)
    }
}

/// Initialize with default configuration
///
/// # Errors
///
/// See [`init_with`].
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
///
/// Idempotent like [`auto_init`].
///
/// # Errors
///
/// Returns error if the filter cannot be parsed or installing the subscriber
/// fails for a reason other than one already being installed.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    if tracing::dispatcher::has_been_set() {
        return Ok(LoggerGuard::noop());
    }
    LoggerBuilder::from_config(config).build()
}
