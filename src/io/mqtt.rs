//! MQTT client for the realtime status feed and device location samples
//!
//! One connection subscribes to both topics and routes publishes by topic:
//! - feed topic: whole lift-status snapshots `{ "<tunnel>": {"north": bool, "south": bool} }`
//! - location topic: `{"locations": [{"coords": {...}, "timestamp": ...}]}` or `{"error": "..."}`

use crate::domain::error::{FeedError, LocationError};
use crate::domain::events::InboundEvent;
use crate::domain::status::{LiftStatus, RawLiftStatus};
use crate::domain::types::{
    deserialize_timestamp, GeoPoint, LocationSample, TimestampValue, TunnelId,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct RawCoords {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    #[serde(default)]
    coords: Option<RawCoords>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: TimestampValue,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    #[serde(default)]
    locations: Vec<RawSample>,
    #[serde(default)]
    error: Option<String>,
}

/// Start the MQTT client and forward parsed events to the coordinator
///
/// Events are sent via try_send so a slow coordinator never stalls the
/// eventloop. Broker outages are reported once per outage as `FeedError`.
pub async fn start_mqtt_client(
    config: &Config,
    event_tx: mpsc::Sender<InboundEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("{}-ingest-{}", config.mqtt_client_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    let feed_topic = config.feed_topic().to_string();
    let location_topic = config.location_topic().to_string();
    let topics = [feed_topic.clone(), location_topic.clone()];

    info!(
        feed_topic = %feed_topic,
        location_topic = %location_topic,
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_client_starting"
    );

    // Report an outage once, not on every reconnect attempt
    let mut outage_reported = false;
    // Set when a subscribe request could not be queued; retried on later events
    let mut subscribe_pending = false;
    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                let event = match result {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        outage_reported = false;
                        // Clean sessions lose subscriptions, so subscribe on every connect
                        subscribe_pending = !subscribe_all(&client, &topics);
                        info!("mqtt_connected");
                        None
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match std::str::from_utf8(&publish.payload) {
                            Ok(json) if publish.topic == feed_topic => Some(match parse_status_snapshot(json) {
                                Ok(snapshot) => InboundEvent::StatusSnapshot(snapshot),
                                Err(e) => InboundEvent::FeedError(e),
                            }),
                            Ok(json) if publish.topic == location_topic => Some(match parse_location_batch(json) {
                                Ok(samples) => InboundEvent::LocationBatch(samples),
                                Err(e) => InboundEvent::LocationError(e),
                            }),
                            Ok(_) => {
                                debug!(topic = %publish.topic, "mqtt_unexpected_topic");
                                None
                            }
                            Err(e) => {
                                warn!(topic = %publish.topic, error = %e, "mqtt_invalid_utf8");
                                None
                            }
                        }
                    }
                    Ok(_) if subscribe_pending => {
                        subscribe_pending = !subscribe_all(&client, &topics);
                        None
                    }
                    Ok(_) => None,
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        let report = !std::mem::replace(&mut outage_reported, true);
                        report.then(|| InboundEvent::FeedError(FeedError::Disconnected(e.to_string())))
                    }
                };

                let Some(event) = event else { continue };
                debug!(event = %event.as_str(), "mqtt_event");
                if let Err(e) = event_tx.try_send(event) {
                    match e {
                        TrySendError::Full(_) => {
                            metrics.record_event_dropped();
                            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                warn!("mqtt_event_dropped: channel full");
                                last_drop_warn = Instant::now();
                            }
                        }
                        TrySendError::Closed(_) => {
                            warn!("event_channel_closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Queue a subscription for every topic; false if any request was refused
fn subscribe_all<T: AsRef<str>>(client: &AsyncClient, topics: &[T]) -> bool {
    let mut all_queued = true;
    for topic in topics {
        let topic = topic.as_ref();
        if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
            warn!(topic = %topic, error = %e, "mqtt_subscribe_failed");
            all_queued = false;
        }
    }
    all_queued
}

/// Parse a feed snapshot; `null` or `{}` means no tunnel has reported yet
pub fn parse_status_snapshot(json: &str) -> Result<HashMap<TunnelId, LiftStatus>, FeedError> {
    let raw: Option<HashMap<String, Option<RawLiftStatus>>> =
        serde_json::from_str(json).map_err(|e| FeedError::Malformed(e.to_string()))?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(tunnel, status)| status.map(|s| (TunnelId(tunnel), LiftStatus::from(s))))
        .collect())
}

/// Parse a location batch into valid samples
///
/// Samples with missing or out-of-range coordinates are dropped. A batch
/// with nothing usable is an error so the coordinator can surface it.
pub fn parse_location_batch(json: &str) -> Result<Vec<LocationSample>, LocationError> {
    let payload: LocationPayload =
        serde_json::from_str(json).map_err(|e| LocationError::Malformed(e.to_string()))?;

    if let Some(message) = payload.error {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("permission") || lowered.contains("unauthorized") {
            return Err(LocationError::PermissionDenied);
        }
        return Err(LocationError::Unavailable(message));
    }

    if payload.locations.is_empty() {
        return Err(LocationError::Empty);
    }

    let samples: Vec<LocationSample> = payload
        .locations
        .into_iter()
        .filter_map(|raw| {
            let point = match (raw.coords, raw.latitude, raw.longitude) {
                (Some(coords), _, _) => GeoPoint::new(coords.latitude, coords.longitude),
                (None, Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
                _ => return None,
            };
            point.is_valid().then(|| LocationSample {
                point,
                timestamp_ms: timestamp_to_epoch_ms(&raw.timestamp),
            })
        })
        .collect();

    if samples.is_empty() {
        return Err(LocationError::Malformed("no sample with valid coordinates".to_string()));
    }
    Ok(samples)
}

/// Parse RFC 3339 timestamp to epoch milliseconds
fn parse_iso_time(time_str: &str) -> Option<u64> {
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as u64)
}

fn timestamp_to_epoch_ms(ts: &TimestampValue) -> u64 {
    match ts {
        TimestampValue::EpochMs(ms) => *ms,
        TimestampValue::IsoString(s) => parse_iso_time(s).unwrap_or(0),
        TimestampValue::None => 0,
    }
}
