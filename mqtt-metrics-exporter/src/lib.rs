//! Prometheus exporter for values published on MQTT topics.
//!
//! Each configured metric binds one exact MQTT topic to a Prometheus counter or
//! gauge. Payloads are converted to numbers (`"on"`/`"off"` or a decimal literal)
//! and applied to the bound metric, which is then served on an HTTP `/metrics`
//! endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   MQTT broker   │────>│   Dispatcher    │────>│   HTTP Server   │
//! │ (topic per      │     │ (convert, add   │     │   (/metrics)    │
//! │  metric)        │     │  or set)        │     │                 │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! mqtt-metrics --config mqtt-metrics.json5
//! ```
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod convert;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod metric;
pub mod registry;

pub use config::{ConfigError, ExporterConfig, MetricConfig};
pub use convert::{ConversionError, convert, convert_payload};
pub use dispatcher::{BridgeDispatcher, MetricBinding};
pub use error::{ExporterError, Result};
pub use http::HttpServer;
pub use logging::init_tracing;
pub use metric::{MetricKind, MetricSpec};
pub use registry::{MetricHandle, MetricsRegistry, SharedRegistry};
