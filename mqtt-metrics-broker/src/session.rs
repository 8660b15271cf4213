//! MQTT session: drives the `rumqttc` event loop and feeds the gateway.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, SubscribeReasonCode};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BrokerConfig, STATE_OFFLINE};
use crate::error::{BrokerError, Result};
use crate::gateway::{BrokerEvent, ConnectionState, Gateway};
use crate::transport::MqttTransport;

/// Owns the broker connection for the lifetime of the process.
///
/// The event loop runs on a background task once [`connect`](Self::connect)
/// succeeds. Dropping the session stops that task; [`close`](Self::close) also
/// publishes the offline state and sends DISCONNECT first.
pub struct MqttSession {
    config: BrokerConfig,
    gateway: Gateway,
    eventloop: Option<EventLoop>,
    task: Option<JoinHandle<()>>,
}

impl MqttSession {
    /// Create the client for `config`. No network traffic happens until `connect`.
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let options = config.mqtt_options()?;
        let qos = config.qos()?;

        let (client, eventloop) = AsyncClient::new(options, config.request_capacity);
        let gateway = Gateway::new(MqttTransport::new(client, qos))
            .with_state_topic(config.state_topic.clone())
            .with_publish_timeout(Duration::from_secs(config.connect_timeout_secs));

        Ok(Self {
            config,
            gateway,
            eventloop: Some(eventloop),
            task: None,
        })
    }

    /// The gateway fed by this session.
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Connect and wait for the broker's CONNACK, then hand the event loop to a
    /// background task. The connect callback has already run when this returns.
    ///
    /// A failed attempt leaves the session ready for another call.
    pub async fn connect(&mut self) -> Result<()> {
        let mut eventloop = self
            .eventloop
            .take()
            .ok_or_else(|| BrokerError::State("session already connected".to_string()))?;

        let addr = self.config.addr();
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);

        info!(addr = %addr, "Connecting to MQTT broker");
        self.gateway.set_state(ConnectionState::Connecting);

        let outcome = tokio::time::timeout(timeout, wait_for_connack(&mut eventloop)).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.gateway.set_state(ConnectionState::Disconnected);
                self.eventloop = Some(eventloop);
                return Err(BrokerError::Connect {
                    addr,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                self.gateway.set_state(ConnectionState::Disconnected);
                self.eventloop = Some(eventloop);
                return Err(BrokerError::ConnectTimeout {
                    addr,
                    secs: self.config.connect_timeout_secs,
                });
            }
        }

        self.gateway.handle_event(BrokerEvent::Connected);

        let gateway = self.gateway.clone();
        let retry_delay = Duration::from_secs(self.config.reconnect_delay_secs);
        self.task = Some(tokio::spawn(run_event_loop(eventloop, gateway, retry_delay)));

        Ok(())
    }

    /// Publish the offline state, disconnect, and wait for the event loop to stop.
    pub async fn close(mut self) {
        if let Some(task) = self.task.take() {
            if let Some(topic) = self.gateway.state_topic() {
                if let Err(e) = self
                    .gateway
                    .publish_with_retain(topic, STATE_OFFLINE.into(), true)
                {
                    warn!(topic = %topic, error = %e, "Failed to publish offline state");
                }
            }

            if let Err(e) = self.gateway.transport_disconnect() {
                warn!(error = %e, "Failed to request disconnect");
            }

            let abort = task.abort_handle();
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                debug!("Event loop did not stop in time, aborting");
                abort.abort();
            }
        }

        self.gateway.set_state(ConnectionState::Disconnected);
        info!("MQTT session closed");
    }
}

impl Drop for MqttSession {
    /// Best effort: requests are queued but the task is stopped right away, so the
    /// broker may only learn about it through the last will.
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if let Some(topic) = self.gateway.state_topic() {
                let _ = self
                    .gateway
                    .publish_with_retain(topic, STATE_OFFLINE.into(), true);
            }
            let _ = self.gateway.transport_disconnect();
            task.abort();
            self.gateway.set_state(ConnectionState::Disconnected);
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

/// Translate a client event into a gateway event. `None` means no gateway action.
pub(crate) fn translate(event: Event) -> Option<BrokerEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(BrokerEvent::Connected),
        Event::Incoming(Packet::Publish(publish)) => Some(BrokerEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }),
        Event::Incoming(Packet::SubAck(ack)) => Some(BrokerEvent::SubscribeAck {
            pkid: ack.pkid,
            granted: !ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure)),
        }),
        Event::Incoming(Packet::PubAck(ack)) => Some(BrokerEvent::PublishAck { pkid: ack.pkid }),
        Event::Outgoing(Outgoing::Subscribe(pkid)) => Some(BrokerEvent::SubscribeSent { pkid }),
        Event::Outgoing(Outgoing::Publish(pkid)) => Some(BrokerEvent::PublishSent { pkid }),
        Event::Incoming(Packet::Disconnect) => Some(BrokerEvent::Disconnected {
            reason: "broker sent DISCONNECT".to_string(),
        }),
        _ => None,
    }
}

/// Poll until the client disconnects on request. Errors are reported to the
/// gateway; the next poll makes the client reconnect.
async fn run_event_loop(mut eventloop: EventLoop, gateway: Gateway, retry_delay: Duration) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent, stopping event loop");
                break;
            }
            Ok(event) => {
                if let Some(event) = translate(event) {
                    gateway.handle_event(event);
                }
            }
            Err(e) => {
                gateway.handle_event(BrokerEvent::Disconnected {
                    reason: e.to_string(),
                });
                gateway.set_state(ConnectionState::Connecting);
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}
