//! Layered CLI configuration: defaults, TOML file, `PERCOLATE_` environment, flags

use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use percolate_poll::{EngineConfig, Method, PollOptions, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything the CLI can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Engine tuning
    pub engine: EngineConfig,
    /// Options applied to every watched endpoint
    pub defaults: PollOptions,
    /// Endpoints to watch
    pub endpoints: Vec<EndpointEntry>,
    /// Logging
    pub log: percolate_log::Config,
}

/// One endpoint from the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Command-line overrides; unset flags leave lower layers untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    pub defaults: DefaultsOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefaultsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl Settings {
    /// Load settings from every layer and validate the engine section.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment, overrides)
    }

    /// Load settings from an in-memory TOML document.
    #[cfg(test)]
    pub fn from_toml(document: &str, overrides: &Overrides) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(document));
        Self::extract(figment, overrides)
    }

    fn extract(figment: Figment, overrides: &Overrides) -> Result<Self> {
        let settings: Self = figment
            .merge(
                Env::prefixed("PERCOLATE_")
                    .ignore(&["log", "log_format", "config"])
                    .split("__"),
            )
            .merge(Serialized::defaults(overrides))
            .extract()
            .context("failed to load configuration")?;

        settings.engine.validate().context("invalid engine configuration")?;
        settings.defaults.validate().context("invalid poll defaults")?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn defaults_without_any_layer() {
        let settings = Settings::from_toml("", &Overrides::default()).unwrap();
        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.defaults, PollOptions::default());
        assert!(settings.endpoints.is_empty());
    }

    #[test]
    fn toml_layer_fills_sections() {
        let settings = Settings::from_toml(
            r#"
            [engine]
            degraded_skip_probability = 0.5

            [engine.spacing]
            high_ms = 250

            [defaults]
            interval = 3000
            priority = "high"

            [[endpoints]]
            key = "cashier-orders"
            url = "http://shop.local/api/orders"

            [log]
            format = "json"
            "#,
            &Overrides::default(),
        )
        .unwrap();

        assert!((settings.engine.degraded_skip_probability - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.engine.spacing.high_ms, 250);
        assert_eq!(settings.engine.spacing.normal_ms, 1_000);
        assert_eq!(settings.defaults.interval, Duration::from_millis(3_000));
        assert_eq!(settings.defaults.priority, Priority::High);
        assert_eq!(settings.defaults.max_retries, 3);
        assert_eq!(settings.endpoints[0].key, "cashier-orders");
        assert_eq!(settings.endpoints[0].method, Method::Get);
        assert_eq!(settings.log.format, percolate_log::Format::Json);
    }

    #[test]
    fn flags_win_over_file() {
        let overrides = Overrides {
            defaults: DefaultsOverrides {
                interval: Some(8_000),
                ..DefaultsOverrides::default()
            },
        };
        let settings = Settings::from_toml("[defaults]\ninterval = 3000\nmax_retries = 5", &overrides).unwrap();

        assert_eq!(settings.defaults.interval, Duration::from_millis(8_000));
        assert_eq!(settings.defaults.max_retries, 5);
    }

    #[test]
    fn invalid_engine_section_is_rejected() {
        let err = Settings::from_toml("[engine]\nmin_interval_ms = 0", &Overrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("min_interval_ms"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/percolate.toml")), &Overrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
