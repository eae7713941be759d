//! Foot tunnel lift proximity notifier
//!
//! Watches device location samples and alerts when the holder reaches a
//! tunnel entrance, including the live lift status for that tunnel.
//!
//! Module structure:
//! - `domain/` - Core types (entrances, lift status, events, errors)
//! - `io/` - External interfaces (MQTT ingest, notifiers, status HTTP)
//! - `services/` - Business logic (Coordinator, proximity, dispatch)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use tunnel_lifts::infra::{Config, Metrics};
use tunnel_lifts::io::{build_channel, start_mqtt_client, start_status_server};
use tunnel_lifts::services::Coordinator;

/// Foot tunnel lift proximity notifier
#[derive(Parser, Debug)]
#[command(name = "tunnel-lifts", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-sample visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("tunnel-lifts starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path)
        .with_context(|| format!("invalid configuration in {config_path}"))?;

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        feed_topic = %config.feed_topic(),
        location_topic = %config.location_topic(),
        entrances = %config.entrances().len(),
        trigger_radius_m = %config.trigger_radius_m(),
        cooldown_secs = %config.cooldown().as_secs(),
        notify_mode = %config.notify_mode().as_str(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Bounded for backpressure; the MQTT client drops rather than blocks
    let (event_tx, event_rx) = mpsc::channel(1000);

    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_mqtt_client(&mqtt_config, event_tx, mqtt_metrics, mqtt_shutdown).await
        {
            tracing::error!(error = %e, "mqtt_client_error");
        }
    });

    let channel = build_channel(&config);
    let http_port = config.http_port();
    let metrics_interval = config.metrics_interval_secs();
    let site_id = config.site_id().to_string();
    let mut coordinator = Coordinator::new(config, channel, metrics.clone());

    if http_port > 0 {
        let status_metrics = metrics.clone();
        let status_view = coordinator.subscribe();
        let status_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                start_status_server(http_port, status_metrics, status_view, site_id, status_shutdown)
                    .await
            {
                tracing::error!(error = %e, "status_server_error");
            }
        });
    }

    if metrics_interval > 0 {
        let reporter_metrics = metrics.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            // First tick fires immediately; skip the empty report
            interval.tick().await;
            loop {
                interval.tick().await;
                reporter_metrics.report().log();
            }
        });
    }

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Runs until the MQTT client stops and drops the event sender
    info!(entrances = %coordinator.entrances().len(), "coordinator_started");
    coordinator.run(event_rx).await;

    info!("tunnel-lifts shutdown complete");
    Ok(())
}
