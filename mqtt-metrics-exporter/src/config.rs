//! Configuration for the MQTT metrics exporter.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use mqtt_metrics_broker::BrokerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::BRIDGE_SUBSYSTEM;
use crate::metric::MetricSpec;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Metric '{name}' has unknown type '{kind}' (expected \"counter\" or \"gauge\")")]
    UnknownMetricKind { name: String, kind: String },
    #[error("Topic '{topic}' is bound to more than one metric")]
    DuplicateTopic { topic: String },
    #[error("Metric name '{name}' is used more than once")]
    DuplicateName { name: String },
    #[error("Metric '{name}' is exported as '{exposed}', which metric '{other}' already uses")]
    NameConflict {
        name: String,
        exposed: String,
        other: String,
    },
    #[error("Metric name '{name}' uses the prefix '{prefix}' reserved for bridge metrics")]
    ReservedName { name: String, prefix: String },
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// MQTT broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Topic to metric bindings, in declaration order.
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9701").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Prefix of every exported metric name (default: "home", also used when empty).
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_listen() -> String {
    "0.0.0.0:9701".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_namespace() -> String {
    "home".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            namespace: default_namespace(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// One configured topic to metric binding, as written in the file.
///
/// `type` stays a string here so that an unknown kind is reported as a
/// configuration error naming the metric, rather than a generic parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub topic: String,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 (or plain JSON) file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: ExporterConfig = json5::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Fill in values that may be left blank in the file.
    pub fn normalize(&mut self) {
        if self.prometheus.namespace.is_empty() {
            self.prometheus.namespace = default_namespace();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if !is_valid_metric_name(&self.prometheus.namespace) {
            return Err(ConfigError::Validation(format!(
                "Invalid namespace: {}",
                self.prometheus.namespace
            )));
        }

        self.metric_specs().map(|_| ())
    }

    /// Resolve every configured metric and check the result with [`check_bindings`].
    pub fn metric_specs(&self) -> Result<Vec<MetricSpec>, ConfigError> {
        let specs = self
            .metrics
            .iter()
            .map(MetricSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        check_bindings(&specs)?;
        Ok(specs)
    }

    /// Broker settings with a request queue large enough to hold one subscription
    /// per metric plus the state-topic publishes issued from the connect callback.
    pub fn broker_config(&self) -> BrokerConfig {
        let mut broker = self.broker.clone();
        broker.request_capacity = broker.request_capacity.max(self.metrics.len() + 2);
        broker
    }
}

/// Reject bindings that would break the exposition or the dispatch table: invalid
/// or reserved names, wildcard topics, duplicate topics, and metrics whose exported
/// names overlap (a counter `x_total` is exported as family `x` with sample
/// `x_total`, so it clashes with a gauge `x`).
pub fn check_bindings(specs: &[MetricSpec]) -> Result<(), ConfigError> {
    let reserved = format!("{BRIDGE_SUBSYSTEM}_");
    let mut names = HashSet::new();
    let mut topics = HashSet::new();
    let mut exposed: HashMap<String, &str> = HashMap::new();

    for spec in specs {
        if !is_valid_metric_name(&spec.name) || !is_valid_metric_name(spec.family_name()) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric name '{}': must match [a-zA-Z_][a-zA-Z0-9_]*",
                spec.name
            )));
        }

        if spec.name.starts_with(&reserved) {
            return Err(ConfigError::ReservedName {
                name: spec.name.clone(),
                prefix: reserved,
            });
        }

        if spec.topic.is_empty() || spec.topic.contains(['+', '#']) {
            return Err(ConfigError::Validation(format!(
                "Metric '{}' needs an exact topic without wildcards (got '{}')",
                spec.name, spec.topic
            )));
        }

        if !names.insert(spec.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                name: spec.name.clone(),
            });
        }
        if !topics.insert(spec.topic.as_str()) {
            return Err(ConfigError::DuplicateTopic {
                topic: spec.topic.clone(),
            });
        }

        for name in spec.exposed_names() {
            if let Some(other) = exposed.get(&name) {
                return Err(ConfigError::NameConflict {
                    name: spec.name.clone(),
                    exposed: name,
                    other: other.to_string(),
                });
            }
            exposed.insert(name, &spec.name);
        }
    }

    Ok(())
}

/// Whether `name` matches `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
