//! `percolate`: watch order endpoints with the adaptive polling engine.

mod cli;
mod commands;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::settings::{Overrides, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Command::Watch(args) => args.overrides(),
        Command::Interval(_) => Overrides::default(),
    };
    let settings = Settings::load(cli.config.as_deref(), &overrides)?;

    let mut log = settings.log.clone();
    log.apply_env(|name| std::env::var(name).ok());
    if let Some(format) = cli.log_format {
        log.format = format;
    }
    if let Some(level) = &cli.log_level {
        log.level.clone_from(level);
    }
    let _guard = percolate_log::init_with(log).context("failed to initialize logging")?;

    match cli.command {
        Command::Watch(args) => commands::watch::run(args, settings).await,
        Command::Interval(args) => commands::interval::run(&args, &settings),
    }
}
