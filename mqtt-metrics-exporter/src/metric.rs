//! Metric descriptors resolved from configuration.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::{ConfigError, MetricConfig};

/// Kind of metric a topic feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Cumulative; each observation is added.
    Counter,
    /// Point-in-time; each observation overwrites the value.
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(other.to_string()),
        }
    }
}

/// Immutable description of one topic-fed metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSpec {
    pub name: String,
    pub kind: MetricKind,
    pub description: String,
    pub topic: String,
}

impl MetricSpec {
    pub fn new(
        name: impl Into<String>,
        kind: MetricKind,
        description: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            topic: topic.into(),
        }
    }
}

impl MetricSpec {
    /// Family name in the exposition, before the namespace prefix. Counters drop a
    /// configured `_total` suffix because the encoder appends it to their samples.
    pub fn family_name(&self) -> &str {
        match self.kind {
            MetricKind::Counter => self.name.strip_suffix("_total").unwrap_or(&self.name),
            MetricKind::Gauge => &self.name,
        }
    }

    /// Every name this metric occupies in the exposition: the family and, for
    /// counters, the `_total` sample.
    pub fn exposed_names(&self) -> Vec<String> {
        let family = self.family_name();
        match self.kind {
            MetricKind::Counter => vec![family.to_string(), format!("{family}_total")],
            MetricKind::Gauge => vec![family.to_string()],
        }
    }
}

impl TryFrom<&MetricConfig> for MetricSpec {
    type Error = ConfigError;

    fn try_from(config: &MetricConfig) -> Result<Self, Self::Error> {
        let kind = config
            .kind
            .parse()
            .map_err(|kind| ConfigError::UnknownMetricKind {
                name: config.name.clone(),
                kind,
            })?;

        Ok(Self {
            name: config.name.clone(),
            kind,
            description: config.description.clone(),
            topic: config.topic.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: &str) -> MetricConfig {
        MetricConfig {
            name: "door_open".to_string(),
            kind: kind.to_string(),
            description: "Front door".to_string(),
            topic: "home/door".to_string(),
        }
    }

    #[test]
    fn test_spec_from_config() {
        let spec = MetricSpec::try_from(&config("gauge")).unwrap();
        assert_eq!(
            spec,
            MetricSpec::new("door_open", MetricKind::Gauge, "Front door", "home/door")
        );
        assert_eq!(
            MetricSpec::try_from(&config("counter")).unwrap().kind,
            MetricKind::Counter
        );
    }

    #[test]
    fn test_unknown_kind_is_a_config_error() {
        let err = MetricSpec::try_from(&config("histogram")).unwrap_err();
        match err {
            ConfigError::UnknownMetricKind { name, kind } => {
                assert_eq!(name, "door_open");
                assert_eq!(kind, "histogram");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exposed_names() {
        let counter = MetricSpec::new("pulses_total", MetricKind::Counter, "", "t");
        assert_eq!(counter.family_name(), "pulses");
        assert_eq!(counter.exposed_names(), vec!["pulses", "pulses_total"]);

        let gauge = MetricSpec::new("level_total", MetricKind::Gauge, "", "t");
        assert_eq!(gauge.family_name(), "level_total");
        assert_eq!(gauge.exposed_names(), vec!["level_total"]);
    }

    #[test]
    fn test_kind_is_case_sensitive() {
        assert!(MetricSpec::try_from(&config("Gauge")).is_err());
    }
}
