//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use percolate_log::Format;
use percolate_poll::{ConnectionQuality, PollContext, Priority};

use crate::settings::{DefaultsOverrides, Overrides};

#[derive(Debug, Parser)]
#[command(name = "percolate")]
#[command(about = "Adaptive polling for order queues", version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "PERCOLATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true)]
    pub log_format: Option<Format>,

    /// Log filter directive, e.g. `percolate_poll=debug`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll endpoints and print every event
    Watch(WatchArgs),
    /// Print the interval the engine would choose for the given inputs
    Interval(IntervalArgs),
}

/// A `KEY=URL` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub key: String,
    pub url: String,
}

fn parse_target(value: &str) -> Result<Target, String> {
    let (key, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=URL, got `{value}`"))?;
    if key.trim().is_empty() || url.trim().is_empty() {
        return Err(format!("expected KEY=URL, got `{value}`"));
    }
    Ok(Target {
        key: key.trim().to_string(),
        url: url.trim().to_string(),
    })
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Endpoints as KEY=URL, added to those in the config file
    #[arg(value_parser = parse_target)]
    pub targets: Vec<Target>,

    /// Base interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Retries per failure episode
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Base retry delay in milliseconds
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Scheduling priority
    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,

    /// Exit after this many events
    #[arg(long)]
    pub count: Option<usize>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            defaults: DefaultsOverrides {
                interval: self.interval_ms,
                max_retries: self.max_retries,
                retry_delay: self.retry_delay_ms,
                priority: self.priority.map(Into::into),
            },
        }
    }
}

#[derive(Debug, Args)]
pub struct IntervalArgs {
    /// Base interval in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub base_ms: u64,

    /// Orders currently shown
    #[arg(long, default_value_t = 0)]
    pub orders: usize,

    /// Some orders are still active
    #[arg(long)]
    pub active: bool,

    /// Consecutive failed attempts
    #[arg(long, default_value_t = 0)]
    pub errors: u32,

    /// Polling context
    #[arg(long, value_enum, default_value_t = ContextArg::Normal)]
    pub context: ContextArg,

    /// Connection quality
    #[arg(long, value_enum, default_value_t = QualityArg::Excellent)]
    pub quality: QualityArg,

    /// The page is hidden
    #[arg(long)]
    pub hidden: bool,

    /// Milliseconds since the last user input
    #[arg(long, default_value_t = 10_000)]
    pub idle_ms: u64,

    /// Print the decision as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::High => Self::High,
            PriorityArg::Normal => Self::Normal,
            PriorityArg::Low => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContextArg {
    Normal,
    HighInteraction,
    Background,
    Critical,
}

impl From<ContextArg> for PollContext {
    fn from(value: ContextArg) -> Self {
        match value {
            ContextArg::Normal => Self::Normal,
            ContextArg::HighInteraction => Self::HighInteraction,
            ContextArg::Background => Self::Background,
            ContextArg::Critical => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QualityArg {
    Excellent,
    Good,
    Poor,
    Offline,
}

impl From<QualityArg> for ConnectionQuality {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Excellent => Self::Excellent,
            QualityArg::Good => Self::Good,
            QualityArg::Poor => Self::Poor,
            QualityArg::Offline => Self::Offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_targets() {
        assert_eq!(
            parse_target("cashier-orders=http://shop.local/api/orders?status=pending"),
            Ok(Target {
                key: "cashier-orders".to_string(),
                url: "http://shop.local/api/orders?status=pending".to_string(),
            })
        );
        assert!(parse_target("no-url").is_err());
        assert!(parse_target("=http://shop.local").is_err());
    }

    #[test]
    fn watch_flags_become_overrides() {
        let cli = Cli::parse_from([
            "percolate",
            "watch",
            "k=http://shop.local",
            "--interval-ms",
            "3000",
            "--priority",
            "high",
        ]);
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        let overrides = args.overrides();
        assert_eq!(overrides.defaults.interval, Some(3_000));
        assert_eq!(overrides.defaults.priority, Some(Priority::High));
        assert_eq!(overrides.defaults.max_retries, None);
    }
}
