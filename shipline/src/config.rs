//! Engine configuration.
//!
//! Configuration can be built in code, parsed from JSON, or read from
//! environment variables:
//!
//! - `SHIPLINE_APPROVAL_TIMEOUT_SECS`: default approval gate timeout (unset = wait forever)
//! - `SHIPLINE_ARCHIVE_LIMIT`: number of finished run reports kept in memory
//! - `SHIPLINE_RETAIN_ARTIFACTS`: "false" to release a failed run's artifacts
//! - `SHIPLINE_LOG` or `RUST_LOG`: log filter string
//! - `SHIPLINE_LOG_FORMAT`: "json", "pretty", or "compact"

use crate::errors::ShiplineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

fn default_archive_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON lines for log aggregation.
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = ShiplineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(ShiplineError::Config(format!(
                "unknown log format '{other}', expected json, pretty or compact"
            ))),
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ShiplineError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ShiplineError::Config(format!(
            "{key}='{raw}': expected true/false, 1/0, yes/no or on/off"
        ))),
    }
}

/// Logging configuration consumed by [`init_tracing`](crate::observability::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string (e.g. "info,shipline=debug").
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Whether to include the event target.
    #[serde(default = "default_true")]
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
            include_target: true,
        }
    }
}

/// Configuration for a [`PipelineEngine`](crate::engine::PipelineEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default approval gate timeout in seconds. `None` waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_timeout_secs: Option<u64>,
    /// Keep a failed run's artifacts for diagnosis.
    #[serde(default = "default_true")]
    pub retain_artifacts_on_failure: bool,
    /// Number of finished run reports kept by the engine.
    #[serde(default = "default_archive_limit")]
    pub archive_limit: usize,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: None,
            retain_artifacts_on_failure: true,
            archive_limit: default_archive_limit(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default approval timeout.
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Sets whether failed runs keep their artifacts.
    #[must_use]
    pub fn with_retain_artifacts_on_failure(mut self, retain: bool) -> Self {
        self.retain_artifacts_on_failure = retain;
        self
    }

    /// Sets the archive size.
    #[must_use]
    pub fn with_archive_limit(mut self, limit: usize) -> Self {
        self.archive_limit = limit;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Returns the default approval timeout.
    #[must_use]
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ShiplineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ShiplineError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ShiplineError::Config`] if a variable is set to a value that
    /// does not parse.
    pub fn from_env() -> Result<Self, ShiplineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ShiplineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("SHIPLINE_APPROVAL_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                ShiplineError::Config(format!("SHIPLINE_APPROVAL_TIMEOUT_SECS='{raw}': {e}"))
            })?;
            config.approval_timeout_secs = Some(secs);
        }

        if let Some(raw) = lookup("SHIPLINE_ARCHIVE_LIMIT") {
            config.archive_limit = raw.trim().parse::<usize>().map_err(|e| {
                ShiplineError::Config(format!("SHIPLINE_ARCHIVE_LIMIT='{raw}': {e}"))
            })?;
        }

        if let Some(raw) = lookup("SHIPLINE_RETAIN_ARTIFACTS") {
            config.retain_artifacts_on_failure = parse_flag("SHIPLINE_RETAIN_ARTIFACTS", &raw)?;
        }

        if let Some(filter) = lookup("SHIPLINE_LOG").or_else(|| lookup("RUST_LOG")) {
            config.logging.filter = filter;
        }

        if let Some(raw) = lookup("SHIPLINE_LOG_FORMAT") {
            config.logging.format = raw.parse().map_err(|e| match e {
                ShiplineError::Config(msg) => {
                    ShiplineError::Config(format!("SHIPLINE_LOG_FORMAT: {msg}"))
                }
                other => other,
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.approval_timeout(), None);
        assert!(config.retain_artifacts_on_failure);
        assert_eq!(config.archive_limit, 100);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_from_lookup() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SHIPLINE_APPROVAL_TIMEOUT_SECS", "3600"),
            ("SHIPLINE_ARCHIVE_LIMIT", "5"),
            ("SHIPLINE_RETAIN_ARTIFACTS", "false"),
            ("RUST_LOG", "debug"),
            ("SHIPLINE_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.approval_timeout(), Some(Duration::from_secs(3600)));
        assert_eq!(config.archive_limit, 5);
        assert!(!config.retain_artifacts_on_failure);
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_shipline_log_wins_over_rust_log() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SHIPLINE_LOG", "shipline=trace"),
            ("RUST_LOG", "warn"),
        ]))
        .unwrap();
        assert_eq!(config.logging.filter, "shipline=trace");
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = EngineConfig::from_lookup(lookup(&[("SHIPLINE_ARCHIVE_LIMIT", "lots")])).unwrap_err();
        assert!(matches!(err, ShiplineError::Config(ref msg) if msg.contains("SHIPLINE_ARCHIVE_LIMIT")));
    }

    #[test]
    fn test_unknown_log_format_is_config_error() {
        let err = EngineConfig::from_lookup(lookup(&[("SHIPLINE_LOG_FORMAT", "jsn")])).unwrap_err();
        assert!(matches!(err, ShiplineError::Config(ref msg) if msg.contains("SHIPLINE_LOG_FORMAT") && msg.contains("jsn")));
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    }

    #[test]
    fn test_retain_artifacts_flag_values() {
        for (raw, expected) in [("no", false), ("OFF", false), ("0", false), ("yes", true), ("on", true), ("1", true)] {
            let config = EngineConfig::from_lookup(lookup(&[("SHIPLINE_RETAIN_ARTIFACTS", raw)])).unwrap();
            assert_eq!(config.retain_artifacts_on_failure, expected, "value {raw}");
        }

        let err = EngineConfig::from_lookup(lookup(&[("SHIPLINE_RETAIN_ARTIFACTS", "maybe")])).unwrap_err();
        assert!(matches!(err, ShiplineError::Config(ref msg) if msg.contains("SHIPLINE_RETAIN_ARTIFACTS")));
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json_str(r#"{"approval_timeout_secs": 60}"#).unwrap();
        assert_eq!(config.approval_timeout_secs, Some(60));
        assert_eq!(config.archive_limit, 100);
        assert!(config.logging.include_target);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig::new()
            .with_archive_limit(7)
            .with_logging(LoggingConfig {
                format: LogFormat::Pretty,
                ..LoggingConfig::default()
            });
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        assert_eq!(EngineConfig::from_path(&path).unwrap(), config);
    }
}
