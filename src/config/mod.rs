//! Typed dispatcher configuration.
//!
//! Loaded from environment variables or a TOML file. Every field has a
//! default, so an empty environment yields a working immediate-reclaim setup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long an idle partition survives after its last submission.
    /// Zero reclaims idle partitions on the next sweep.
    pub idle_retention_ms: u64,
    pub log_level: String,
    pub otel_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idle_retention_ms: 0,
            log_level: "info".to_string(),
            otel_endpoint: None,
            service_name: "autoworker".to_string(),
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    dispatch: DispatchConfig,
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let idle_retention_ms = match std::env::var("AUTOWORKER_IDLE_RETENTION_MS") {
            Ok(raw) => raw.trim().parse().map_err(|e| {
                Error::Config(format!("AUTOWORKER_IDLE_RETENTION_MS={raw:?} is not a u64: {e}"))
            })?,
            Err(_) => defaults.idle_retention_ms,
        };

        Ok(Self {
            idle_retention_ms,
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            service_name: std::env::var("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
        })
    }

    /// Load configuration from a TOML file with a `[dispatch]` table.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.dispatch)
    }

    pub fn idle_retention(&self) -> Duration {
        Duration::from_millis(self.idle_retention_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_only_given_fields() {
        let config = DispatchConfig::from_toml_str(
            r#"
            [dispatch]
            idle_retention_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.idle_retention(), Duration::from_millis(2500));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.service_name, "autoworker");
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(
            DispatchConfig::from_toml_str("").unwrap(),
            DispatchConfig::default()
        );
    }

    #[test]
    fn toml_rejects_wrong_types() {
        assert!(DispatchConfig::from_toml_str("[dispatch]\nidle_retention_ms = \"soon\"").is_err());
    }
}
