//! MQTT Broker Gateway
//!
//! Owns one MQTT connection and turns it into a small callback-oriented API:
//!
//! - [`Gateway`] keeps exactly one handler per topic and one callback per lifecycle
//!   event, and demultiplexes inbound messages by exact topic.
//! - [`MqttSession`] drives the `rumqttc` event loop, reports connects, losses and
//!   messages to the gateway, and keeps polling so the client reconnects on its own.
//! - [`Transport`] is the seam between the two; tests substitute a recording
//!   implementation (feature `test-util`).
//!
//! Sessions are clean, so the broker forgets subscriptions on every reconnect. The
//! connect callback is the place to (re-)issue them:
//!
//! ```ignore
//! use mqtt_metrics_broker::{BrokerConfig, MqttSession};
//!
//! let mut session = MqttSession::new(config)?;
//! session.gateway().on_connect(|gateway| {
//!     if let Err(e) = gateway.subscribe("home/door", |topic, payload| {
//!         tracing::info!(topic, len = payload.len(), "message");
//!     }) {
//!         tracing::error!(error = %e, "subscribe failed");
//!     }
//! });
//! session.connect().await?;
//! ```

mod config;
mod error;
mod gateway;
mod session;
mod transport;

pub use config::{BrokerConfig, STATE_OFFLINE, STATE_ONLINE};
pub use error::{BrokerError, Result};
pub use gateway::{
    BrokerEvent, ConnectHandler, ConnectionState, DisconnectHandler, Gateway, GatewayStats,
    MessageHandler,
};
pub use session::MqttSession;
pub use transport::{MqttTransport, Transport};

#[cfg(any(test, feature = "test-util"))]
pub use transport::{Published, RecordingTransport};
