//! Prometheus registry holding every exported metric.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::{Metric, Registry};
use tracing::debug;

use crate::metric::{MetricKind, MetricSpec};

/// Counter with floating-point increments.
pub type FloatCounter = Counter<f64, AtomicU64>;

/// Gauge holding a floating-point value.
pub type FloatGauge = Gauge<f64, AtomicU64>;

/// Live handle to a registered metric, resolved once when the binding is built.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(FloatCounter),
    Gauge(FloatGauge),
}

impl MetricHandle {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Apply one observation: counters add it, gauges take it as the new value.
    pub fn apply(&self, value: f64) {
        match self {
            MetricHandle::Counter(counter) => {
                counter.inc_by(value);
            }
            MetricHandle::Gauge(gauge) => {
                gauge.set(value);
            }
        }
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        match self {
            MetricHandle::Counter(counter) => counter.get(),
            MetricHandle::Gauge(gauge) => gauge.get(),
        }
    }
}

/// Thread-safe wrapper around a `prometheus-client` registry.
///
/// Every name is prefixed with the configured namespace. Metrics are registered at
/// startup; scrapes only take the read lock, and handle updates never lock at all.
#[derive(Debug)]
pub struct MetricsRegistry {
    registry: RwLock<Registry>,
    namespace: String,
}

/// Shareable registry handle.
pub type SharedRegistry = Arc<MetricsRegistry>;

impl MetricsRegistry {
    /// Create an empty registry. An empty namespace disables the prefix.
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let registry = if namespace.is_empty() {
            Registry::default()
        } else {
            Registry::with_prefix(namespace.clone())
        };

        Self {
            registry: RwLock::new(registry),
            namespace,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Register a counter for `spec`.
    ///
    /// The text encoder appends `_total` to counter names, so a configured name that
    /// already ends with it is registered without the suffix.
    pub fn new_counter(&self, spec: &MetricSpec) -> FloatCounter {
        let counter = FloatCounter::default();
        self.register(spec.family_name(), &spec.description, counter.clone());
        counter
    }

    /// Register a gauge for `spec`.
    pub fn new_gauge(&self, spec: &MetricSpec) -> FloatGauge {
        let gauge = FloatGauge::default();
        self.register(&spec.name, &spec.description, gauge.clone());
        gauge
    }

    /// Register the metric matching `spec.kind`.
    pub fn new_metric(&self, spec: &MetricSpec) -> MetricHandle {
        match spec.kind {
            MetricKind::Counter => MetricHandle::Counter(self.new_counter(spec)),
            MetricKind::Gauge => MetricHandle::Gauge(self.new_gauge(spec)),
        }
    }

    /// Register an arbitrary metric at the top level.
    pub fn register(&self, name: &str, help: &str, metric: impl Metric) {
        debug!(namespace = %self.namespace, name, "Registering metric");
        self.registry.write().register(name, help, metric);
    }

    /// Register metrics under `<namespace>_<subsystem>_`.
    pub fn with_subsystem<F>(&self, subsystem: &str, register: F)
    where
        F: FnOnce(&mut Registry),
    {
        let mut registry = self.registry.write();
        register(registry.sub_registry_with_prefix(subsystem));
    }

    /// Encode every metric in the OpenMetrics text format.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut output = String::new();
        encode(&mut output, &self.registry.read())?;
        Ok(output)
    }
}
