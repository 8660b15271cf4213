//! Transport seam between the gateway and the MQTT client library.

use rumqttc::{AsyncClient, QoS};

use crate::error::{BrokerError, Result};

/// Outbound requests the gateway issues to the underlying client.
///
/// Every method is a non-blocking enqueue: the gateway calls them from inside
/// lifecycle callbacks that run on the event-loop task, which must never wait on
/// its own request queue.
pub trait Transport: Send + Sync + 'static {
    /// Request a subscription for one exact topic.
    fn subscribe(&self, topic: &str) -> Result<()>;

    /// Request a publish.
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    /// Request an orderly disconnect.
    fn disconnect(&self) -> Result<()>;
}

/// [`Transport`] backed by a `rumqttc` client.
#[derive(Clone, Debug)]
pub struct MqttTransport {
    client: AsyncClient,
    subscribe_qos: QoS,
}

impl MqttTransport {
    /// Wrap a client; subscriptions are requested with `subscribe_qos`.
    pub fn new(client: AsyncClient, subscribe_qos: QoS) -> Self {
        Self {
            client,
            subscribe_qos,
        }
    }
}

impl Transport for MqttTransport {
    fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .try_subscribe(topic, self.subscribe_qos)
            .map_err(|e| BrokerError::subscribe(topic, e))
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|e| BrokerError::publish(topic, e))
    }

    fn disconnect(&self) -> Result<()> {
        self.client
            .try_disconnect()
            .map_err(|e| BrokerError::State(format!("disconnect request failed: {}", e)))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use recording::{Published, RecordingTransport};

#[cfg(any(test, feature = "test-util"))]
mod recording {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::Transport;
    use crate::error::{BrokerError, Result};

    /// A publish captured by [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Published {
        pub topic: String,
        pub payload: Vec<u8>,
        pub retain: bool,
    }

    #[derive(Debug, Default)]
    struct Log {
        subscriptions: Vec<String>,
        published: Vec<Published>,
        disconnects: usize,
        refuse: bool,
    }

    /// In-memory transport that records every request instead of sending it.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingTransport {
        log: Arc<Mutex<Log>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent request fail, as a saturated queue would.
        pub fn refuse_requests(&self, refuse: bool) {
            self.log.lock().refuse = refuse;
        }

        /// Every subscription request, in order, including repeats.
        pub fn subscriptions(&self) -> Vec<String> {
            self.log.lock().subscriptions.clone()
        }

        /// Number of subscription requests issued for `topic`.
        pub fn subscription_count(&self, topic: &str) -> usize {
            self.log
                .lock()
                .subscriptions
                .iter()
                .filter(|t| t.as_str() == topic)
                .count()
        }

        pub fn published(&self) -> Vec<Published> {
            self.log.lock().published.clone()
        }

        pub fn disconnects(&self) -> usize {
            self.log.lock().disconnects
        }
    }

    impl Transport for RecordingTransport {
        fn subscribe(&self, topic: &str) -> Result<()> {
            let mut log = self.log.lock();
            if log.refuse {
                return Err(BrokerError::subscribe(topic, "request queue full"));
            }
            log.subscriptions.push(topic.to_string());
            Ok(())
        }

        fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
            let mut log = self.log.lock();
            if log.refuse {
                return Err(BrokerError::publish(topic, "request queue full"));
            }
            log.published.push(Published {
                topic: topic.to_string(),
                payload,
                retain,
            });
            Ok(())
        }

        fn disconnect(&self) -> Result<()> {
            self.log.lock().disconnects += 1;
            Ok(())
        }
    }
}
