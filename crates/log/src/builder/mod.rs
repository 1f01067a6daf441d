//! Logger builder implementation

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{Config, Format, Writer};
use crate::error::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by a successful initialization.
///
/// The subscriber is global and stays installed; the guard records whether
/// this call installed it.
#[derive(Debug)]
#[must_use = "the guard reports whether this call installed the subscriber"]
pub struct LoggerGuard {
    installed: bool,
}

impl LoggerGuard {
    pub(crate) const fn noop() -> Self {
        Self { installed: false }
    }

    /// Whether this initialization installed the global subscriber.
    #[must_use]
    pub const fn installed(&self) -> bool {
        self.installed
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub const fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Override the filter directive
    #[must_use]
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Override the output format
    #[must_use]
    pub const fn format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    /// Build the filter and format layer without installing them.
    ///
    /// # Errors
    ///
    /// Returns error if the filter string cannot be parsed.
    pub fn layer(&self) -> LogResult<BoxedLayer> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })?;

        let layer = match self.config.writer {
            Writer::Stderr => fmt_layer(&self.config, std::io::stderr),
            Writer::Stdout => fmt_layer(&self.config, std::io::stdout),
        };
        Ok(layer.with_filter(filter).boxed())
    }

    /// Build and install the logger as the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - Another global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let layer = self.layer()?;
        Registry::default()
            .with(layer)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?;

        tracing::debug!(level = %self.config.level, format = %self.config.format, "logger initialized");
        Ok(LoggerGuard { installed: true })
    }
}

fn fmt_layer<W>(config: &Config, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let display = &config.display;
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(display.colors)
        .with_target(display.target)
        .with_file(display.source)
        .with_line_number(display.source)
        .with_thread_ids(display.thread_ids);

    match (config.format, display.time) {
        (Format::Pretty, true) => layer.pretty().boxed(),
        (Format::Pretty, false) => layer.pretty().without_time().boxed(),
        (Format::Compact, true) => layer.compact().boxed(),
        (Format::Compact, false) => layer.compact().without_time().boxed(),
        (Format::Json, time) => {
            let layer = layer
                .json()
                .with_current_span(true)
                .with_span_list(display.span_list)
                .flatten_event(display.flatten);
            if time {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Format::Pretty)]
    #[case(Format::Compact)]
    #[case(Format::Json)]
    fn builds_layer_for_every_format(#[case] format: Format) {
        let builder = LoggerBuilder::from_config(Config::default()).format(format);
        assert!(builder.layer().is_ok());
    }

    #[test]
    fn rejects_malformed_filter() {
        let builder = LoggerBuilder::from_config(Config::default()).level("percolate_poll=loudest");
        assert!(matches!(builder.layer(), Err(LogError::Filter { .. })));
    }

    #[test]
    fn layer_works_with_scoped_subscriber() {
        let layer = LoggerBuilder::from_config(Config::default().with_level("trace"))
            .layer()
            .unwrap();
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(key = "cashier-orders", "polling started");
        });
    }
}
