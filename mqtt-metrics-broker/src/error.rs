//! Error types for the broker gateway.

use thiserror::Error;

/// Result type alias using [`BrokerError`].
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur while talking to the MQTT broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Invalid broker configuration.
    #[error("Broker configuration error: {0}")]
    Config(String),

    /// The initial connection could not be established.
    #[error("Failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    /// The broker did not acknowledge the connection in time.
    #[error("Timed out after {secs}s waiting for broker {addr} to accept the connection")]
    ConnectTimeout { addr: String, secs: u64 },

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A subscription request was rejected by the transport or the broker.
    #[error("Failed to subscribe to {topic}: {message}")]
    Subscribe { topic: String, message: String },

    /// A publish request was rejected by the transport.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// The gateway was already connected or closed.
    #[error("Invalid gateway state: {0}")]
    State(String),
}

impl BrokerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a subscription error for a topic.
    pub fn subscribe(topic: impl Into<String>, message: impl ToString) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            message: message.to_string(),
        }
    }

    /// Create a publish error for a topic.
    pub fn publish(topic: impl Into<String>, message: impl ToString) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.to_string(),
        }
    }
}
