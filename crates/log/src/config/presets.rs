//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format};

/// Filter override, checked first.
pub const LOG_ENV: &str = "PERCOLATE_LOG";
/// Format override (`pretty`, `compact` or `json`).
pub const FORMAT_ENV: &str = "PERCOLATE_LOG_FORMAT";

impl Config {
    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Apply `PERCOLATE_LOG` (or `RUST_LOG`) and `PERCOLATE_LOG_FORMAT`
    /// as read through `lookup`.
    ///
    /// An unknown format name leaves the format unchanged.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(LOG_ENV).or_else(|| lookup("RUST_LOG")) {
            self.level = level;
        }
        if let Some(format) = lookup(FORMAT_ENV)
            && let Ok(format) = format.parse()
        {
            self.format = format;
        }
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Set the filter directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the output format
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn percolate_log_wins_over_rust_log() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("PERCOLATE_LOG", "percolate_poll=trace"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.level, "percolate_poll=trace");
    }

    #[test]
    fn rust_log_is_the_fallback() {
        let mut config = Config::default();
        config.apply_env(env(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, "warn");
    }

    #[rstest]
    #[case("json", Format::Json)]
    #[case("PRETTY", Format::Pretty)]
    #[case("compact", Format::Compact)]
    #[case("xml", Format::Compact)]
    fn format_override(#[case] value: &str, #[case] expected: Format) {
        let mut config = Config::default();
        config.apply_env(env(&[("PERCOLATE_LOG_FORMAT", value)]));
        assert_eq!(config.format, expected);
    }

    #[test]
    fn presets_differ_in_format_and_level() {
        assert_eq!(Config::development().format, Format::Pretty);
        assert_eq!(Config::development().level, "debug");
        assert_eq!(Config::production().format, Format::Json);
        assert!(!Config::production().display.colors);
    }

    #[test]
    fn deserializes_partial_config() {
        let config: Config = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.level, "info");
    }
}
