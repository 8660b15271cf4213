//! Topic-keyed message dispatch and connection lifecycle hooks.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use crate::config::STATE_ONLINE;
use crate::error::{BrokerError, Result};
use crate::transport::Transport;

/// Handler invoked with `(topic, payload)` for every message on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Callback fired on every transition into [`ConnectionState::Connected`].
pub type ConnectHandler = Arc<dyn Fn(&Gateway) + Send + Sync>;

/// Callback fired on every transition out of [`ConnectionState::Connected`].
pub type DisconnectHandler = Arc<dyn Fn(&BrokerError) + Send + Sync>;

/// Connection state as observed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-independent view of what happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker accepted the connection.
    Connected,
    /// The connection failed or was lost.
    Disconnected { reason: String },
    /// An application message arrived.
    Message { topic: String, payload: Vec<u8> },
    /// A SUBSCRIBE packet was written with packet id `pkid`.
    SubscribeSent { pkid: u16 },
    /// The broker answered the subscription with packet id `pkid`.
    SubscribeAck { pkid: u16, granted: bool },
    /// A PUBLISH packet was written with packet id `pkid`.
    PublishSent { pkid: u16 },
    /// The broker acknowledged the publish with packet id `pkid`.
    PublishAck { pkid: u16 },
}

/// Gateway counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayStats {
    /// Transitions into Connected.
    pub connects: u64,
    /// Transitions out of Connected.
    pub disconnects: u64,
    /// Application messages received.
    pub messages_received: u64,
    /// Messages dropped because no handler was registered for their topic.
    pub messages_unhandled: u64,
    /// Subscription requests handed to the transport.
    pub subscribe_requests: u64,
    /// Subscriptions rejected by the transport or refused by the broker.
    pub subscribe_failures: u64,
    /// Publishes rejected by the transport or not acknowledged in time.
    pub publish_failures: u64,
    /// Topics whose latest subscription the broker refused.
    pub refused_topics: Vec<String>,
}

/// Requests handed to the transport, matched to packet ids as they are written.
///
/// The transport writes requests in the order they were queued, so the next
/// packet id reported belongs to the oldest queued request. An id that is already
/// in flight is a retransmission and consumes nothing.
struct Outstanding<T> {
    queued: VecDeque<T>,
    in_flight: HashMap<u16, T>,
}

impl<T> Outstanding<T> {
    fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    fn push(&mut self, item: T) {
        self.queued.push_back(item);
    }

    fn sent(&mut self, pkid: u16) {
        if self.in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(item) = self.queued.pop_front() {
            self.in_flight.insert(pkid, item);
        }
    }

    fn acked(&mut self, pkid: u16) -> Option<T> {
        self.in_flight.remove(&pkid)
    }
}

type PublishWaiter = Option<oneshot::Sender<()>>;

/// Default bound on how long [`Gateway::publish`] waits for the broker.
const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

struct Shared {
    handlers: RwLock<HashMap<String, MessageHandler>>,
    on_connect: RwLock<Option<ConnectHandler>>,
    on_disconnect: RwLock<Option<DisconnectHandler>>,
    state: RwLock<ConnectionState>,
    subscriptions: Mutex<Outstanding<String>>,
    publishes: Mutex<Outstanding<PublishWaiter>>,
    stats: RwLock<GatewayStats>,
}

/// Broker gateway: one handler per topic, one callback per lifecycle event.
///
/// Cheap to clone; clones share the handler table, callbacks and state. The
/// handler table is independent of the connection, so it survives reconnects and
/// the connect callback can re-issue every subscription.
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    state_topic: Option<String>,
    publish_timeout: Duration,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("state", &self.state())
            .field("topics", &self.subscribed_topics())
            .field("state_topic", &self.state_topic)
            .finish()
    }
}

impl Gateway {
    /// Create a gateway issuing requests through `transport`.
    pub fn new(transport: impl Transport) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Create a gateway from a shared transport.
    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                handlers: RwLock::new(HashMap::new()),
                on_connect: RwLock::new(None),
                on_disconnect: RwLock::new(None),
                state: RwLock::new(ConnectionState::Disconnected),
                subscriptions: Mutex::new(Outstanding::new()),
                publishes: Mutex::new(Outstanding::new()),
                stats: RwLock::new(GatewayStats::default()),
            }),
            state_topic: None,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Bound how long [`publish`](Self::publish) waits for the broker's acknowledgement.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Publish retained "online" to `topic` on every connect.
    pub fn with_state_topic(mut self, topic: Option<String>) -> Self {
        self.state_topic = topic;
        self
    }

    /// The configured availability topic, if any.
    pub fn state_topic(&self) -> Option<&str> {
        self.state_topic.as_deref()
    }

    /// Register `handler` for `topic` and request the subscription from the broker.
    ///
    /// A second call for the same topic replaces the handler, so repeated calls never
    /// produce duplicate deliveries. The handler stays registered even if the request
    /// fails, which lets the next connect retry it.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Result<()>
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.subscribe_arc(topic, Arc::new(handler))
    }

    /// Same as [`subscribe`](Self::subscribe) with an already shared handler.
    pub fn subscribe_arc(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        let replaced = self
            .shared
            .handlers
            .write()
            .insert(topic.to_string(), handler)
            .is_some();

        self.shared.stats.write().subscribe_requests += 1;

        // Held across the enqueue so queue order matches the transport's write order.
        let mut pending = self.shared.subscriptions.lock();
        match self.transport.subscribe(topic) {
            Ok(()) => {
                pending.push(topic.to_string());
                debug!(topic = %topic, replaced, "Subscription requested");
                Ok(())
            }
            Err(e) => {
                self.shared.stats.write().subscribe_failures += 1;
                Err(e)
            }
        }
    }

    /// Publish `payload` to `topic` and wait for the broker's acknowledgement.
    ///
    /// A rejected request (closed client, saturated queue) or a missing
    /// acknowledgement within the publish timeout is reported as
    /// [`BrokerError::Publish`]. Must not be awaited from a gateway callback, since
    /// those run on the task that receives the acknowledgement.
    pub async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.enqueue_publish(topic, payload.into(), false, Some(tx))?;

        match tokio::time::timeout(self.publish_timeout, rx).await {
            Ok(Ok(())) => {
                trace!(topic = %topic, "Publish acknowledged");
                Ok(())
            }
            Ok(Err(_)) => Err(BrokerError::publish(
                topic,
                "gateway dropped before acknowledgement",
            )),
            Err(_) => {
                self.shared.stats.write().publish_failures += 1;
                Err(BrokerError::publish(
                    topic,
                    format!(
                        "no acknowledgement within {}ms",
                        self.publish_timeout.as_millis()
                    ),
                ))
            }
        }
    }

    /// Queue a publish without waiting for the broker. Safe inside callbacks.
    pub(crate) fn publish_with_retain(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<()> {
        self.enqueue_publish(topic, payload, retain, None)
    }

    fn enqueue_publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        waiter: PublishWaiter,
    ) -> Result<()> {
        let mut pending = self.shared.publishes.lock();
        match self.transport.publish(topic, payload, retain) {
            Ok(()) => {
                pending.push(waiter);
                Ok(())
            }
            Err(e) => {
                self.shared.stats.write().publish_failures += 1;
                Err(e)
            }
        }
    }

    /// Install the connect callback, replacing any previous one.
    pub fn on_connect<F>(&self, callback: F)
    where
        F: Fn(&Gateway) + Send + Sync + 'static,
    {
        *self.shared.on_connect.write() = Some(Arc::new(callback));
    }

    /// Install the disconnect callback, replacing any previous one.
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn(&BrokerError) + Send + Sync + 'static,
    {
        *self.shared.on_disconnect.write() = Some(Arc::new(callback));
    }

    /// Apply one connection event. Callbacks run on the caller's task, after every
    /// internal lock has been released.
    pub fn handle_event(&self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => self.handle_connected(),
            BrokerEvent::Disconnected { reason } => self.handle_disconnected(reason),
            BrokerEvent::Message { topic, payload } => self.dispatch(&topic, &payload),
            BrokerEvent::SubscribeSent { pkid } => self.shared.subscriptions.lock().sent(pkid),
            BrokerEvent::SubscribeAck { pkid, granted } => self.handle_suback(pkid, granted),
            BrokerEvent::PublishSent { pkid } => self.shared.publishes.lock().sent(pkid),
            BrokerEvent::PublishAck { pkid } => self.handle_puback(pkid),
        }
    }

    /// Deliver a message to the handler registered for its exact topic.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) {
        self.shared.stats.write().messages_received += 1;

        let handler = self.shared.handlers.read().get(topic).cloned();
        match handler {
            Some(handler) => handler(topic, payload),
            None => {
                self.shared.stats.write().messages_unhandled += 1;
                trace!(topic = %topic, "No handler for topic, dropping message");
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Topics with a registered handler, sorted.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.shared.handlers.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Snapshot of the gateway counters.
    pub fn stats(&self) -> GatewayStats {
        self.shared.stats.read().clone()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.shared.state.write() = state;
    }

    pub(crate) fn transport_disconnect(&self) -> Result<()> {
        self.transport.disconnect()
    }

    fn handle_connected(&self) {
        let previous = std::mem::replace(&mut *self.shared.state.write(), ConnectionState::Connected);
        if previous == ConnectionState::Connected {
            debug!("Connected event while already connected");
        }

        let connects = {
            let mut stats = self.shared.stats.write();
            stats.connects += 1;
            stats.connects
        };

        info!(connects, "MQTT connected");

        if let Some(topic) = &self.state_topic {
            if let Err(e) = self.publish_with_retain(topic, STATE_ONLINE.into(), true) {
                warn!(topic = %topic, error = %e, "Failed to publish online state");
            }
        }

        let callback = self.shared.on_connect.read().clone();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    fn handle_disconnected(&self, reason: String) {
        // SUBSCRIBEs written on the lost connection are never answered. Unacked
        // publishes are retransmitted by the client, so they stay in flight.
        self.shared.subscriptions.lock().in_flight.clear();

        let previous =
            std::mem::replace(&mut *self.shared.state.write(), ConnectionState::Disconnected);
        if previous != ConnectionState::Connected {
            debug!(reason = %reason, state = %previous, "Connection attempt failed");
            return;
        }

        self.shared.stats.write().disconnects += 1;
        warn!(reason = %reason, "MQTT connection lost");

        let callback = self.shared.on_disconnect.read().clone();
        if let Some(callback) = callback {
            callback(&BrokerError::ConnectionLost(reason));
        }
    }

    fn handle_suback(&self, pkid: u16, granted: bool) {
        let topic = self.shared.subscriptions.lock().acked(pkid);

        if granted {
            trace!(pkid, topic = ?topic, "Subscription acknowledged");
            if let Some(topic) = topic {
                self.shared.stats.write().refused_topics.retain(|t| *t != topic);
            }
            return;
        }

        let mut stats = self.shared.stats.write();
        stats.subscribe_failures += 1;
        match topic {
            Some(topic) => {
                error!(
                    topic = %topic,
                    "Broker refused subscription, topic will not be observed"
                );
                if !stats.refused_topics.contains(&topic) {
                    stats.refused_topics.push(topic);
                }
            }
            None => error!(pkid, "Broker refused a subscription"),
        }
    }

    fn handle_puback(&self, pkid: u16) {
        let waiter = self.shared.publishes.lock().acked(pkid);
        if let Some(Some(waiter)) = waiter {
            // The publisher may have timed out already.
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gateway() -> (Gateway, RecordingTransport) {
        let transport = RecordingTransport::new();
        (Gateway::new(transport.clone()), transport)
    }

    fn message(topic: &str, payload: &str) -> BrokerEvent {
        BrokerEvent::Message {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_dispatch_to_exact_topic() {
        let (gateway, _) = gateway();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        gateway
            .subscribe("home/door", move |topic, payload| {
                sink.lock().push((topic.to_string(), payload.to_vec()));
            })
            .unwrap();

        gateway.handle_event(message("home/door", "on"));
        gateway.handle_event(message("home/door/extra", "off"));
        gateway.handle_event(message("home/+", "off"));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("home/door".to_string(), b"on".to_vec()));
        assert_eq!(gateway.stats().messages_received, 3);
        assert_eq!(gateway.stats().messages_unhandled, 2);
    }

    #[test]
    fn test_resubscribe_replaces_handler() {
        let (gateway, transport) = gateway();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        gateway
            .subscribe("t", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let counter = second.clone();
        gateway
            .subscribe("t", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        gateway.dispatch("t", b"1");

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(transport.subscription_count("t"), 2);
        assert_eq!(gateway.subscribed_topics(), vec!["t".to_string()]);
    }

    #[test]
    fn test_connect_callback_fires_on_every_connect() {
        let (gateway, transport) = gateway();
        gateway.on_connect(|gw| {
            gw.subscribe("a", |_, _| {}).unwrap();
        });

        gateway.handle_event(BrokerEvent::Connected);
        assert!(gateway.is_connected());
        gateway.handle_event(BrokerEvent::Disconnected {
            reason: "io error".to_string(),
        });
        assert_eq!(gateway.state(), ConnectionState::Disconnected);
        gateway.handle_event(BrokerEvent::Connected);

        assert_eq!(transport.subscription_count("a"), 2);
        assert_eq!(gateway.stats().connects, 2);
        assert_eq!(gateway.stats().disconnects, 1);
    }

    #[test]
    fn test_disconnect_callback_only_on_loss_of_connection() {
        let (gateway, _) = gateway();
        let losses = Arc::new(Mutex::new(Vec::new()));

        let sink = losses.clone();
        gateway.on_disconnect(move |err| sink.lock().push(err.to_string()));

        // A failed attempt while never connected is not a transition out of Connected.
        gateway.handle_event(BrokerEvent::Disconnected {
            reason: "refused".to_string(),
        });
        assert!(losses.lock().is_empty());

        gateway.handle_event(BrokerEvent::Connected);
        gateway.handle_event(BrokerEvent::Disconnected {
            reason: "reset by peer".to_string(),
        });

        let losses = losses.lock();
        assert_eq!(losses.len(), 1);
        assert!(losses[0].contains("reset by peer"));
    }

    #[test]
    fn test_callback_slot_is_replaced() {
        let (gateway, _) = gateway();
        let calls = Arc::new(AtomicUsize::new(0));

        gateway.on_connect(|_| panic!("replaced callback must not run"));
        let counter = calls.clone();
        gateway.on_connect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        gateway.handle_event(BrokerEvent::Connected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_topic_published_on_connect() {
        let transport = RecordingTransport::new();
        let gateway =
            Gateway::new(transport.clone()).with_state_topic(Some("bridge/state".to_string()));

        gateway.handle_event(BrokerEvent::Connected);

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "bridge/state");
        assert_eq!(published[0].payload, b"online".to_vec());
        assert!(published[0].retain);
    }

    #[test]
    fn test_refused_suback_names_the_topic_by_packet_id() {
        let (gateway, _) = gateway();
        gateway.subscribe("a", |_, _| {}).unwrap();
        gateway.subscribe("b", |_, _| {}).unwrap();
        gateway.handle_event(BrokerEvent::SubscribeSent { pkid: 7 });
        gateway.handle_event(BrokerEvent::SubscribeSent { pkid: 8 });

        // Acknowledgements arrive out of request order.
        gateway.handle_event(BrokerEvent::SubscribeAck {
            pkid: 8,
            granted: false,
        });
        gateway.handle_event(BrokerEvent::SubscribeAck {
            pkid: 7,
            granted: true,
        });

        let stats = gateway.stats();
        assert_eq!(stats.subscribe_failures, 1);
        assert_eq!(stats.refused_topics, vec!["b".to_string()]);

        // A later granted subscription clears the refusal.
        gateway.subscribe("b", |_, _| {}).unwrap();
        gateway.handle_event(BrokerEvent::SubscribeSent { pkid: 9 });
        gateway.handle_event(BrokerEvent::SubscribeAck {
            pkid: 9,
            granted: true,
        });
        assert!(gateway.stats().refused_topics.is_empty());
    }

    #[test]
    fn test_subscriptions_lost_with_the_connection_are_forgotten() {
        let (gateway, _) = gateway();
        gateway.handle_event(BrokerEvent::Connected);
        gateway.subscribe("a", |_, _| {}).unwrap();
        gateway.handle_event(BrokerEvent::SubscribeSent { pkid: 1 });
        gateway.handle_event(BrokerEvent::Disconnected {
            reason: "reset".to_string(),
        });

        // A new session may hand out the same id for a different topic.
        gateway.handle_event(BrokerEvent::Connected);
        gateway.subscribe("b", |_, _| {}).unwrap();
        gateway.handle_event(BrokerEvent::SubscribeSent { pkid: 1 });
        gateway.handle_event(BrokerEvent::SubscribeAck {
            pkid: 1,
            granted: false,
        });

        assert_eq!(gateway.stats().refused_topics, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_failures_are_reported() {
        let (gateway, transport) = gateway();
        transport.refuse_requests(true);

        let err = gateway.subscribe("a", |_, _| {}).unwrap_err();
        assert!(matches!(err, BrokerError::Subscribe { .. }));
        // The handler is kept so a later connect can retry it.
        assert_eq!(gateway.subscribed_topics(), vec!["a".to_string()]);

        let err = gateway.publish("out", "1").await.unwrap_err();
        assert!(matches!(err, BrokerError::Publish { .. }));

        let stats = gateway.stats();
        assert_eq!(stats.subscribe_failures, 1);
        assert_eq!(stats.publish_failures, 1);
    }

    /// Yield until the transport has recorded `count` publishes.
    async fn published(transport: &RecordingTransport, count: usize) {
        while transport.published().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_publish_waits_for_acknowledgement() {
        let (gateway, transport) = gateway();

        let publisher = gateway.clone();
        let task = tokio::spawn(async move { publisher.publish("home/cmd", "on").await });
        published(&transport, 1).await;

        gateway.handle_event(BrokerEvent::PublishSent { pkid: 3 });
        assert!(!task.is_finished());
        gateway.handle_event(BrokerEvent::PublishAck { pkid: 3 });

        task.await.unwrap().unwrap();
        let published = transport.published();
        assert_eq!(published[0].topic, "home/cmd");
        assert_eq!(published[0].payload, b"on".to_vec());
        assert!(!published[0].retain);
    }

    #[tokio::test]
    async fn test_publish_without_acknowledgement_times_out() {
        let transport = RecordingTransport::new();
        let gateway = Gateway::new(transport.clone()).with_publish_timeout(Duration::from_millis(50));

        let err = gateway.publish("home/cmd", "on").await.unwrap_err();

        assert!(matches!(err, BrokerError::Publish { .. }));
        assert_eq!(gateway.stats().publish_failures, 1);
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn test_retransmission_does_not_steal_acknowledgement() {
        let (gateway, transport) = gateway();

        let first = gateway.clone();
        let first = tokio::spawn(async move { first.publish("t/1", "1").await });
        published(&transport, 1).await;
        let second = gateway.clone();
        let second = tokio::spawn(async move { second.publish("t/2", "2").await });
        published(&transport, 2).await;

        gateway.handle_event(BrokerEvent::PublishSent { pkid: 1 });
        // Reconnect: the client rewrites packet 1 before the next queued publish.
        gateway.handle_event(BrokerEvent::PublishSent { pkid: 1 });
        gateway.handle_event(BrokerEvent::PublishSent { pkid: 2 });

        gateway.handle_event(BrokerEvent::PublishAck { pkid: 2 });
        second.await.unwrap().unwrap();
        assert!(!first.is_finished());

        gateway.handle_event(BrokerEvent::PublishAck { pkid: 1 });
        first.await.unwrap().unwrap();
    }

    #[test]
    fn test_state_publish_does_not_take_a_waiter() {
        let transport = RecordingTransport::new();
        let gateway =
            Gateway::new(transport.clone()).with_state_topic(Some("bridge/state".to_string()));

        gateway.handle_event(BrokerEvent::Connected);
        gateway.handle_event(BrokerEvent::PublishSent { pkid: 1 });
        gateway.handle_event(BrokerEvent::PublishAck { pkid: 1 });

        assert_eq!(transport.published().len(), 1);
        assert_eq!(gateway.stats().publish_failures, 0);
    }
}
