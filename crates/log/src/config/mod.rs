//! Configuration types
//!
//! - [`Config`]: filter, format, writer and display options
//! - `presets`: development, production and environment-derived setups

mod presets;

pub use presets::{FORMAT_ENV, LOG_ENV};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter directive (e.g., "info", "`percolate_poll=debug,reqwest=warn`")
    pub level: String,

    /// Output format
    pub format: Format,

    /// Output stream
    pub writer: Writer,

    /// Display configuration
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            writer: Writer::Stderr,
            display: DisplayConfig::default(),
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable, multi-line
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for Format {
    type Err = LogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(LogError::Format(value.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Writer {
    /// Standard error
    #[default]
    Stderr,
    /// Standard output
    Stdout,
}

/// Display configuration
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show timestamps
    pub time: bool,
    /// Show source location (`file:line`)
    pub source: bool,
    /// Show target module
    pub target: bool,
    /// Show thread IDs
    pub thread_ids: bool,
    /// Use ANSI colors
    pub colors: bool,
    /// Show span list in JSON
    pub span_list: bool,
    /// Flatten JSON events
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time: true,
            source: false,
            target: true,
            thread_ids: false,
            colors: true,
            span_list: false,
            flatten: false,
        }
    }
}
