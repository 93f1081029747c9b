//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the host application. [`init_tracing`] is a convenience for binaries
//! and tests that do not bring their own.

use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global `tracing` subscriber for the given configuration.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.include_target)
                    .flatten_event(true),
            )
            .try_init()
            .context("Failed to initialize tracing subscriber")?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_target(config.include_target))
            .try_init()
            .context("Failed to initialize tracing subscriber")?,
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(config.include_target))
            .try_init()
            .context("Failed to initialize tracing subscriber")?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_without_panicking() {
        let config = LoggingConfig {
            filter: "not a valid [filter".to_string(),
            ..LoggingConfig::default()
        };

        // Another test may have installed a subscriber first; either way the
        // second call must report an error.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
