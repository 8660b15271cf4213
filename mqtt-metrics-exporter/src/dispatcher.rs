//! Topic to metric dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use mqtt_metrics_broker::{BrokerError, Gateway, MessageHandler, MqttSession};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigError, MetricConfig, check_bindings};
use crate::convert::convert_payload;
use crate::error::ExporterError;
use crate::metric::{MetricKind, MetricSpec};
use crate::registry::{MetricHandle, MetricsRegistry};

/// Sub-prefix of the bridge's own metrics. Configured names may not start with it.
pub const BRIDGE_SUBSYSTEM: &str = "bridge";

/// A configured metric together with its live handle.
#[derive(Debug, Clone)]
pub struct MetricBinding {
    pub spec: MetricSpec,
    pub handle: MetricHandle,
}

/// Point-in-time view of one binding, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BindingSnapshot {
    pub name: String,
    pub kind: MetricKind,
    pub topic: String,
    pub value: f64,
}

/// Self-observability metrics of the bridge, exported under `<namespace>_bridge_`.
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// Observations applied to a metric.
    pub messages_applied: Counter,
    /// Payloads that could not be converted.
    pub conversion_errors: Counter,
    /// Messages for topics without a binding.
    pub unmatched_messages: Counter,
    /// 1 while the broker connection is up.
    pub connected: Gauge,
}

impl DispatchStats {
    fn register(registry: &MetricsRegistry) -> Self {
        let stats = Self::default();
        registry.with_subsystem(BRIDGE_SUBSYSTEM, |sub| {
            sub.register(
                "messages_applied",
                "MQTT messages applied to a metric",
                stats.messages_applied.clone(),
            );
            sub.register(
                "conversion_errors",
                "MQTT payloads that could not be converted to a number",
                stats.conversion_errors.clone(),
            );
            sub.register(
                "unmatched_messages",
                "MQTT messages on topics without a metric binding",
                stats.unmatched_messages.clone(),
            );
            sub.register(
                "connected",
                "Whether the MQTT broker connection is up",
                stats.connected.clone(),
            );
        });
        stats
    }
}

struct Inner {
    /// Topic to binding, built once and never modified.
    bindings: HashMap<String, MetricBinding>,
    /// Topics in configuration order, so subscriptions are issued deterministically.
    topics: Vec<String>,
    stats: DispatchStats,
}

/// Routes MQTT messages to the metric bound to their topic.
///
/// Cheap to clone. Constructing one creates every metric handle; attaching it to a
/// [`Gateway`] makes every connect re-subscribe all configured topics.
#[derive(Clone)]
pub struct BridgeDispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BridgeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeDispatcher")
            .field("topics", &self.inner.topics)
            .finish()
    }
}

impl BridgeDispatcher {
    /// Resolve every configured metric and register its handle with `registry`.
    ///
    /// All entries are validated before anything is registered, so a bad entry
    /// leaves the registry untouched.
    pub fn new(
        metrics: &[MetricConfig],
        registry: &MetricsRegistry,
    ) -> Result<Self, ConfigError> {
        let specs = metrics
            .iter()
            .map(MetricSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_specs(specs, registry)
    }

    /// Same as [`new`](Self::new) from already resolved specs.
    pub fn from_specs(
        specs: Vec<MetricSpec>,
        registry: &MetricsRegistry,
    ) -> Result<Self, ConfigError> {
        check_bindings(&specs)?;

        let stats = DispatchStats::register(registry);
        let mut bindings = HashMap::with_capacity(specs.len());
        let mut topics = Vec::with_capacity(specs.len());

        for spec in specs {
            let handle = registry.new_metric(&spec);
            debug!(
                name = %spec.name,
                kind = %spec.kind,
                topic = %spec.topic,
                "Bound topic to metric"
            );
            topics.push(spec.topic.clone());
            bindings.insert(spec.topic.clone(), MetricBinding { spec, handle });
        }

        Ok(Self {
            inner: Arc::new(Inner {
                bindings,
                topics,
                stats,
            }),
        })
    }

    /// Install the resubscription routine as the gateway's connect callback and the
    /// connection-loss routine as its disconnect callback.
    pub fn attach(&self, gateway: &Gateway) {
        let dispatcher = self.clone();
        gateway.on_connect(move |gateway| {
            dispatcher.resubscribe(gateway);
        });

        let stats = self.inner.stats.clone();
        gateway.on_disconnect(move |err: &BrokerError| {
            stats.connected.set(0);
            warn!(error = %err, "Metric updates paused until the broker connection is restored");
        });
    }

    /// Attach to the session's gateway and open the connection. Fails if the first
    /// connect fails.
    pub async fn start(&self, session: &mut MqttSession) -> Result<(), ExporterError> {
        self.attach(session.gateway());
        session.connect().await?;
        Ok(())
    }

    /// (Re-)subscribe every configured topic. Returns how many requests the
    /// transport accepted.
    pub fn resubscribe(&self, gateway: &Gateway) -> usize {
        self.inner.stats.connected.set(1);

        let dispatcher = self.clone();
        let handler: MessageHandler =
            Arc::new(move |topic: &str, payload: &[u8]| dispatcher.handle_message(topic, payload));

        let mut subscribed = 0;
        for topic in &self.inner.topics {
            match gateway.subscribe_arc(topic, handler.clone()) {
                Ok(()) => subscribed += 1,
                Err(e) => error!(
                    topic = %topic,
                    error = %e,
                    "Subscription failed, topic will not be observed"
                ),
            }
        }

        info!(
            subscribed,
            total = self.inner.topics.len(),
            "Subscribed to metric topics"
        );
        subscribed
    }

    /// Convert `payload` and apply it to the metric bound to `topic`.
    ///
    /// Never fails: unknown topics and unconvertible payloads are logged and dropped
    /// without touching any metric.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        let Some(binding) = self.inner.bindings.get(topic) else {
            self.inner.stats.unmatched_messages.inc();
            trace!(topic = %topic, "No metric bound to topic");
            return;
        };

        let value = match convert_payload(payload) {
            Ok(value) => value,
            Err(e) => {
                self.inner.stats.conversion_errors.inc();
                warn!(
                    topic = %topic,
                    metric = %binding.spec.name,
                    payload = %String::from_utf8_lossy(payload),
                    error = %e,
                    "Failed to convert metric value"
                );
                return;
            }
        };

        if binding.spec.kind == MetricKind::Counter && value < 0.0 {
            warn!(
                topic = %topic,
                metric = %binding.spec.name,
                value,
                "Negative increment applied to counter"
            );
        }

        binding.handle.apply(value);
        self.inner.stats.messages_applied.inc();

        debug!(
            topic = %topic,
            metric = %binding.spec.name,
            value,
            "Applied metric value"
        );
    }

    /// Binding for `topic`.
    pub fn binding(&self, topic: &str) -> Option<&MetricBinding> {
        self.inner.bindings.get(topic)
    }

    /// Configured topics, in configuration order.
    pub fn topics(&self) -> &[String] {
        &self.inner.topics
    }

    pub fn len(&self) -> usize {
        self.inner.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bindings.is_empty()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.inner.stats
    }

    /// Current value of every binding, in configuration order.
    pub fn snapshot(&self) -> Vec<BindingSnapshot> {
        self.inner
            .topics
            .iter()
            .filter_map(|topic| self.inner.bindings.get(topic))
            .map(|binding| BindingSnapshot {
                name: binding.spec.name.clone(),
                kind: binding.spec.kind,
                topic: binding.spec.topic.clone(),
                value: binding.handle.value(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqtt_metrics_broker::{BrokerEvent, RecordingTransport};

    fn metric(name: &str, kind: &str, topic: &str) -> MetricConfig {
        MetricConfig {
            name: name.to_string(),
            kind: kind.to_string(),
            description: format!("{name} from {topic}"),
            topic: topic.to_string(),
        }
    }

    fn dispatcher(metrics: &[MetricConfig]) -> BridgeDispatcher {
        BridgeDispatcher::new(metrics, &MetricsRegistry::new("home")).unwrap()
    }

    fn value(dispatcher: &BridgeDispatcher, topic: &str) -> f64 {
        dispatcher.binding(topic).unwrap().handle.value()
    }

    #[test]
    fn test_one_handle_per_metric() {
        let dispatcher = dispatcher(&[
            metric("door_open", "gauge", "home/door"),
            metric("motion_events", "counter", "home/motion"),
        ]);

        assert_eq!(dispatcher.len(), 2);
        assert_eq!(dispatcher.topics(), ["home/door", "home/motion"]);
        assert_eq!(
            dispatcher.binding("home/door").unwrap().handle.kind(),
            MetricKind::Gauge
        );
        assert_eq!(
            dispatcher.binding("home/motion").unwrap().handle.kind(),
            MetricKind::Counter
        );
    }

    #[test]
    fn test_unknown_kind_fails_construction() {
        let registry = MetricsRegistry::new("home");
        let result = BridgeDispatcher::new(
            &[
                metric("ok", "gauge", "a"),
                metric("bad", "summary", "b"),
            ],
            &registry,
        );

        assert!(matches!(result, Err(ConfigError::UnknownMetricKind { .. })));
        // Nothing was registered for the valid entry either.
        assert!(!registry.render().unwrap().contains("home_ok"));
    }

    #[test]
    fn test_duplicate_topic_fails_construction() {
        let result = BridgeDispatcher::new(
            &[metric("a", "gauge", "t"), metric("b", "gauge", "t")],
            &MetricsRegistry::new("home"),
        );
        assert!(matches!(result, Err(ConfigError::DuplicateTopic { .. })));
    }

    #[test]
    fn test_overlapping_names_fail_construction() {
        let registry = MetricsRegistry::new("home");

        let result = BridgeDispatcher::new(
            &[
                metric("pulses_total", "counter", "home/pulses"),
                metric("pulses", "gauge", "home/rate"),
            ],
            &registry,
        );
        assert!(matches!(result, Err(ConfigError::NameConflict { .. })));

        let result = BridgeDispatcher::new(
            &[metric("bridge_connected", "gauge", "home/link")],
            &registry,
        );
        assert!(matches!(result, Err(ConfigError::ReservedName { .. })));

        // Neither attempt registered anything.
        assert_eq!(registry.render().unwrap(), "# EOF\n");
    }

    #[test]
    fn test_gauge_and_counter_semantics() {
        let dispatcher = dispatcher(&[
            metric("temperature", "gauge", "home/temp"),
            metric("pulses", "counter", "home/pulses"),
        ]);

        dispatcher.handle_message("home/temp", b"21.5");
        dispatcher.handle_message("home/temp", b"23.5");
        dispatcher.handle_message("home/pulses", b"2");
        dispatcher.handle_message("home/pulses", b"3.5");

        assert_eq!(value(&dispatcher, "home/temp"), 23.5);
        assert_eq!(value(&dispatcher, "home/pulses"), 5.5);
        assert_eq!(dispatcher.stats().messages_applied.get(), 4);
    }

    #[test]
    fn test_bad_payload_leaves_metric_unchanged() {
        let dispatcher = dispatcher(&[metric("temperature", "gauge", "home/temp")]);

        dispatcher.handle_message("home/temp", b"20");
        dispatcher.handle_message("home/temp", b"warm");
        dispatcher.handle_message("home/temp", &[0xc3, 0x28]);

        assert_eq!(value(&dispatcher, "home/temp"), 20.0);
        assert_eq!(dispatcher.stats().conversion_errors.get(), 2);

        dispatcher.handle_message("home/temp", b"off");
        assert_eq!(value(&dispatcher, "home/temp"), 0.0);
    }

    #[test]
    fn test_unknown_topic_is_a_noop() {
        let dispatcher = dispatcher(&[metric("temperature", "gauge", "home/temp")]);

        dispatcher.handle_message("home/other", b"42");
        dispatcher.handle_message("home/temp", b"1");

        assert_eq!(value(&dispatcher, "home/temp"), 1.0);
        assert_eq!(dispatcher.stats().unmatched_messages.get(), 1);
    }

    #[test]
    fn test_negative_counter_increment_is_passed_through() {
        let dispatcher = dispatcher(&[metric("pulses", "counter", "home/pulses")]);

        dispatcher.handle_message("home/pulses", b"5");
        dispatcher.handle_message("home/pulses", b"-2");

        assert_eq!(value(&dispatcher, "home/pulses"), 3.0);
    }

    #[test]
    fn test_connect_subscribes_every_topic() {
        let dispatcher = dispatcher(&[
            metric("door_open", "gauge", "home/door"),
            metric("motion_events", "counter", "home/motion"),
        ]);
        let transport = RecordingTransport::new();
        let gateway = mqtt_metrics_broker::Gateway::new(transport.clone());

        dispatcher.attach(&gateway);
        assert!(transport.subscriptions().is_empty());

        gateway.handle_event(BrokerEvent::Connected);

        assert_eq!(transport.subscriptions(), vec!["home/door", "home/motion"]);
        assert_eq!(dispatcher.stats().connected.get(), 1);

        gateway.handle_event(BrokerEvent::Disconnected {
            reason: "timeout".to_string(),
        });
        assert_eq!(dispatcher.stats().connected.get(), 0);
    }

    #[test]
    fn test_resubscribe_reports_refused_requests() {
        let dispatcher = dispatcher(&[metric("door_open", "gauge", "home/door")]);
        let transport = RecordingTransport::new();
        let gateway = mqtt_metrics_broker::Gateway::new(transport.clone());

        transport.refuse_requests(true);
        assert_eq!(dispatcher.resubscribe(&gateway), 0);

        transport.refuse_requests(false);
        assert_eq!(dispatcher.resubscribe(&gateway), 1);
    }

    #[test]
    fn test_snapshot_in_config_order() {
        let dispatcher = dispatcher(&[
            metric("b_metric", "gauge", "z/topic"),
            metric("a_metric", "counter", "a/topic"),
        ]);
        dispatcher.handle_message("z/topic", b"on");

        let snapshot = dispatcher.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "b_metric");
        assert_eq!(snapshot[0].value, 1.0);
        assert_eq!(snapshot[1].kind, MetricKind::Counter);
        assert_eq!(snapshot[1].value, 0.0);
    }
}
