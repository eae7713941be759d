//! End-to-end alert flow through the public API
//!
//! Feeds MQTT-shaped payloads through the parsers into the coordinator and
//! checks what reaches the notification channel.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tunnel_lifts::domain::{DispatchError, Entrance, InboundEvent};
use tunnel_lifts::infra::{Config, Metrics};
use tunnel_lifts::io::mqtt::{parse_location_batch, parse_status_snapshot};
use tunnel_lifts::io::{AlertNotification, NotificationChannel};
use tunnel_lifts::services::Coordinator;

const MINUTE_MS: u64 = 60_000;

#[derive(Default)]
struct Inbox {
    alerts: Mutex<Vec<AlertNotification>>,
}

#[async_trait]
impl NotificationChannel for Inbox {
    async fn send(&self, alert: &AlertNotification) -> Result<(), DispatchError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "inbox"
    }
}

fn config() -> Config {
    Config::default()
        .with_entrances(vec![
            Entrance::new("greenwich-north", "greenwich", 51.4842, -0.0097),
            Entrance::new("greenwich-south", "greenwich", 51.4820, -0.0081),
            Entrance::new("woolwich-north", "woolwich", 51.4926, 0.0692),
            Entrance::new("woolwich-south", "woolwich", 51.4902, 0.0682),
        ])
        .with_sampling(0.0, Duration::ZERO)
}

fn location(lat: f64, lon: f64) -> InboundEvent {
    let json = format!(r#"{{"locations": [{{"coords": {{"latitude": {lat}, "longitude": {lon}}}}}]}}"#);
    InboundEvent::LocationBatch(parse_location_batch(&json).unwrap())
}

#[tokio::test]
async fn test_walk_to_woolwich_north() {
    let inbox = Arc::new(Inbox::default());
    let metrics = Arc::new(Metrics::new());
    let mut coordinator = Coordinator::new(config(), inbox.clone(), metrics.clone());

    let snapshot = parse_status_snapshot(
        r#"{"greenwich": {"north": true, "south": true}, "woolwich": {"north": false, "south": true}}"#,
    )
    .unwrap();
    coordinator.process_event(InboundEvent::StatusSnapshot(snapshot), 0).await;

    // Approach: 200 m, 50 m, then at the entrance
    coordinator.process_event(location(51.4908, 0.0692), 0).await;
    coordinator.process_event(location(51.49215, 0.0692), MINUTE_MS).await;
    assert!(inbox.alerts.lock().is_empty());

    coordinator.process_event(location(51.4926, 0.0692), 2 * MINUTE_MS).await;
    // Lingering at the entrance does not repeat the alert
    coordinator.process_event(location(51.4926, 0.0692), 3 * MINUTE_MS).await;

    let alerts = inbox.alerts.lock();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].entrance.as_str(), "woolwich-north");
    assert_eq!(alerts[0].title, "Approaching Woolwich North Foot Tunnel");
    assert_eq!(alerts[0].body, "North lift: Not working\nSouth lift: Working");
    assert_eq!(metrics.alerts_dispatched(), 1);
}

#[tokio::test]
async fn test_null_feed_renders_unknown() {
    let inbox = Arc::new(Inbox::default());
    let mut coordinator = Coordinator::new(config(), inbox.clone(), Arc::new(Metrics::new()));

    let snapshot = parse_status_snapshot("null").unwrap();
    coordinator.process_event(InboundEvent::StatusSnapshot(snapshot), 0).await;
    coordinator.process_event(location(51.4842, -0.0097), 0).await;

    let alerts = inbox.alerts.lock();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].body.contains("North lift: Unknown"));
    assert!(!alerts[0].body.contains("Not working"));
}
