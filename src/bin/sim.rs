//! Tunnel simulator - feeds the notifier over MQTT
//!
//! Publishes a lift-status snapshot, then walks a simulated device towards a
//! configured entrance, one location sample per step. Alerts published on the
//! notify topic are logged as they arrive.
//!
//! Usage:
//!   cargo run --bin tunnel-sim -- --config config/dev.toml --entrance woolwich-north
//!   cargo run --bin tunnel-sim -- --south-broken --steps 20
//!   cargo run --bin tunnel-sim -- --no-status      # feed never reported

use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use tunnel_lifts::domain::types::{epoch_ms, Entrance, GeoPoint};
use tunnel_lifts::infra::Config;

/// Metres per degree of latitude
const METRES_PER_DEGREE: f64 = 111_195.0;

#[derive(Parser, Debug)]
#[command(name = "tunnel-sim")]
#[command(about = "Publish lift status and a simulated walk to an entrance")]
struct Args {
    /// Config file path (entrances, broker, topics)
    #[arg(short, long)]
    config: Option<String>,

    /// Entrance to walk to (defaults to the first configured)
    #[arg(short, long)]
    entrance: Option<String>,

    /// Start this many metres south of the entrance
    #[arg(long, default_value = "500")]
    start_distance_m: f64,

    /// Number of samples on the way in (the last one is at the entrance)
    #[arg(long, default_value = "10")]
    steps: u32,

    /// Delay between samples
    #[arg(long, default_value = "1000")]
    step_ms: u64,

    /// Publish the north lift as out of service
    #[arg(long)]
    north_broken: bool,

    /// Publish the south lift as out of service
    #[arg(long)]
    south_broken: bool,

    /// Publish a null snapshot (no data) instead of lift status
    #[arg(long)]
    no_status: bool,

    /// Seconds to wait for alerts after the last sample
    #[arg(long, default_value = "5")]
    linger_secs: u64,
}

/// Points from `start_distance_m` south of `target` up to `target` itself
fn walk(target: GeoPoint, start_distance_m: f64, steps: u32) -> Vec<GeoPoint> {
    let steps = steps.max(1);
    (1..=steps)
        .map(|i| {
            let remaining_m = start_distance_m * f64::from(steps - i) / f64::from(steps);
            GeoPoint::new(target.latitude - remaining_m / METRES_PER_DEGREE, target.longitude)
        })
        .collect()
}

fn status_snapshot(config: &Config, north_ok: bool, south_ok: bool) -> serde_json::Value {
    let mut tunnels = serde_json::Map::new();
    for tunnel in config.tunnel_ids() {
        tunnels.insert(tunnel.0, json!({ "north": north_ok, "south": south_ok }));
    }
    serde_json::Value::Object(tunnels)
}

fn location_payload(point: GeoPoint) -> serde_json::Value {
    json!({
        "locations": [{
            "coords": { "latitude": point.latitude, "longitude": point.longitude },
            "timestamp": epoch_ms(),
        }]
    })
}

fn pick_entrance<'a>(config: &'a Config, id: Option<&str>) -> Option<&'a Entrance> {
    match id {
        Some(id) => config.entrances().iter().find(|e| e.id.as_str() == id),
        None => config.entrances().first(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()))?;

    let Some(entrance) = pick_entrance(&config, args.entrance.as_deref()).cloned() else {
        anyhow::bail!("unknown entrance {:?}", args.entrance);
    };

    let client_id = format!("{}-sim-{}", config.mqtt_client_id(), std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqtt_options.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
    let notify_topic = config.notify_topic().to_string();
    client.subscribe(notify_topic.as_str(), QoS::AtLeastOnce).await?;

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == notify_topic => {
                    match serde_json::from_slice::<serde_json::Value>(&publish.payload) {
                        Ok(alert) => info!(
                            title = %alert["title"].as_str().unwrap_or_default(),
                            body = %alert["body"].as_str().unwrap_or_default(),
                            "alert_received"
                        ),
                        Err(e) => warn!(error = %e, "alert_unparseable"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "sim_mqtt_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let snapshot = if args.no_status {
        serde_json::Value::Null
    } else {
        status_snapshot(&config, !args.north_broken, !args.south_broken)
    };
    client
        .publish(config.feed_topic(), QoS::AtLeastOnce, true, snapshot.to_string())
        .await?;
    info!(snapshot = %snapshot, "status_published");

    info!(
        entrance = %entrance.id,
        start_distance_m = %args.start_distance_m,
        steps = %args.steps,
        "walk_started"
    );
    for point in walk(entrance.location, args.start_distance_m, args.steps) {
        tokio::time::sleep(Duration::from_millis(args.step_ms)).await;
        let payload = location_payload(point);
        client
            .publish(config.location_topic(), QoS::AtLeastOnce, false, payload.to_string())
            .await?;
        info!(lat = %point.latitude, lon = %point.longitude, "sample_published");
    }

    tokio::time::sleep(Duration::from_secs(args.linger_secs)).await;
    client.disconnect().await.ok();
    info!("walk_finished");
    Ok(())
}
