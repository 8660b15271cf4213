//! Prometheus exporter for MQTT topics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use mqtt_metrics_broker::MqttSession;
use mqtt_metrics_exporter::{
    BridgeDispatcher, ExporterConfig, HttpServer, MetricsRegistry, init_tracing,
};

/// Prometheus exporter for MQTT topics.
#[derive(Parser, Debug)]
#[command(name = "mqtt-metrics")]
#[command(about = "Expose values published on MQTT topics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, env = "MQTT_METRICS_CONFIG", default_value = "mqtt-metrics.json")]
    config: String,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ExporterConfig::load_from_file(&args.config)?;
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
        config.validate()?;
    }

    init_tracing(&config.logging, args.log_level.as_deref())?;

    info!(
        config = %args.config,
        metrics = config.metrics.len(),
        "Starting MQTT metrics exporter"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let registry = Arc::new(MetricsRegistry::new(config.prometheus.namespace.clone()));
    let dispatcher = BridgeDispatcher::from_specs(config.metric_specs()?, &registry)?;
    let mut session = MqttSession::new(config.broker_config())?;

    let listen_addr: SocketAddr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(
        registry.clone(),
        dispatcher.clone(),
        session.gateway().clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );
    let listener = http_server.bind().await?;

    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve(listener, http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    if let Err(e) = dispatcher.start(&mut session).await {
        error!(error = %e, "Initial broker connection failed");
        let _ = shutdown_tx.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;
        return Err(e.into());
    }

    info!(topics = dispatcher.len(), "Bridge running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let gateway = session.gateway().clone();
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        session.close().await;
        let _ = http_task.await;
    })
    .await;

    let stats = gateway.stats();
    info!(
        connects = stats.connects,
        disconnects = stats.disconnects,
        messages_received = stats.messages_received,
        messages_unhandled = stats.messages_unhandled,
        messages_applied = dispatcher.stats().messages_applied.get(),
        conversion_errors = dispatcher.stats().conversion_errors.get(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

/// Resolves on SIGTERM. Never resolves where the signal is unavailable.
async fn terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
