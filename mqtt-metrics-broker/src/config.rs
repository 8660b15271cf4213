//! Broker connection configuration.

use std::time::Duration;

use rumqttc::{LastWill, MqttOptions, QoS};
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Payload published to the state topic while the bridge is connected.
pub const STATE_ONLINE: &str = "online";

/// Payload published to the state topic on shutdown and as the last will.
pub const STATE_OFFLINE: &str = "offline";

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname or IP address.
    #[serde(default)]
    pub host: String,

    /// Broker TCP port (default: 1883).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Append `-<unix seconds>` to the client identifier so restarts never collide
    /// with a lingering session of the previous process.
    #[serde(default = "default_true")]
    pub unique_client_id: bool,

    /// Username; credentials are only sent when this is set.
    #[serde(default)]
    pub username: Option<String>,

    /// Password paired with `username`.
    #[serde(default)]
    pub password: Option<String>,

    /// Retained availability topic ("online"/"offline"), disabled when unset.
    #[serde(default)]
    pub state_topic: Option<String>,

    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long to wait for the broker to acknowledge the first connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Pause between polls of the event loop after a connection error.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// QoS used for topic subscriptions (0, 1 or 2).
    #[serde(default = "default_subscribe_qos")]
    pub subscribe_qos: u8,

    /// Capacity of the client request queue.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "mqtt-metrics".to_string()
}

fn default_true() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    1
}

fn default_subscribe_qos() -> u8 {
    1
}

fn default_request_capacity() -> usize {
    64
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            client_id: default_client_id(),
            unique_client_id: default_true(),
            username: None,
            password: None,
            state_topic: None,
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            subscribe_qos: default_subscribe_qos(),
            request_capacity: default_request_capacity(),
        }
    }
}

impl BrokerConfig {
    /// `host:port` string used in logs and errors.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the broker parameters.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(BrokerError::config("broker host is required"));
        }

        if self.port == 0 {
            return Err(BrokerError::config("broker port must be > 0"));
        }

        if self.client_id.is_empty() {
            return Err(BrokerError::config("client_id must not be empty"));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(BrokerError::config("password is set but username is missing"));
        }

        if self.keep_alive_secs < 5 {
            return Err(BrokerError::config("keep_alive_secs must be >= 5"));
        }

        if self.connect_timeout_secs == 0 {
            return Err(BrokerError::config("connect_timeout_secs must be > 0"));
        }

        if self.request_capacity == 0 {
            return Err(BrokerError::config("request_capacity must be > 0"));
        }

        if let Some(topic) = &self.state_topic {
            if topic.is_empty() || topic.contains(['+', '#']) {
                return Err(BrokerError::config(format!(
                    "state_topic '{}' must be a non-empty topic without wildcards",
                    topic
                )));
            }
        }

        self.qos()?;
        Ok(())
    }

    /// Subscription QoS as the client library type.
    pub fn qos(&self) -> Result<QoS> {
        match self.subscribe_qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(BrokerError::config(format!(
                "subscribe_qos must be 0, 1 or 2 (got {})",
                other
            ))),
        }
    }

    /// Client identifier sent in the CONNECT packet.
    pub fn effective_client_id(&self) -> String {
        if self.unique_client_id {
            format!("{}-{}", self.client_id, chrono::Utc::now().timestamp())
        } else {
            self.client_id.clone()
        }
    }

    /// Build client options. Sessions are always clean, so every reconnect starts
    /// without server-side subscriptions.
    pub fn mqtt_options(&self) -> Result<MqttOptions> {
        self.validate()?;

        let mut options = MqttOptions::new(self.effective_client_id(), &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_clean_session(true);

        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }

        if let Some(topic) = &self.state_topic {
            options.set_last_will(LastWill::new(
                topic,
                STATE_OFFLINE,
                QoS::AtLeastOnce,
                true,
            ));
        }

        Ok(options)
    }
}
