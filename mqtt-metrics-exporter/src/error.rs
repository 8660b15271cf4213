//! Error types for the exporter.

use mqtt_metrics_broker::BrokerError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the exporter from starting.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;
