//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ExporterError, Result};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `level_override` (from the command line) is
/// used, then the configured level.
pub fn init_tracing(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let level = level_override.unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(level)))
        .map_err(|e| ExporterError::Logging(format!("Invalid log level '{level}': {e}")))?;

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| ExporterError::Logging(format!("Failed to initialize tracing: {e}")))
}

/// Directives applying `level` to our crates while keeping the MQTT client quiet.
fn filter_directives(level: &str) -> String {
    format!("warn,mqtt_metrics_exporter={level},mqtt_metrics={level},mqtt_metrics_broker={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_parse() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(EnvFilter::try_new(filter_directives(level)).is_ok());
        }
    }

    #[test]
    fn test_filter_directives_scope_our_crates() {
        let directives = filter_directives("debug");
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("mqtt_metrics_broker=debug"));
    }
}
