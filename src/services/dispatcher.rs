//! Alert dispatch - format, deliver, and only then arm the cooldown
//!
//! The dispatcher is the sole writer of cooldown state. A failed or
//! abandoned delivery leaves the entrance eligible for the next sample.

use crate::domain::error::DispatchError;
use crate::domain::status::{LiftStatus, StatusBoard};
use crate::domain::types::{AlertEvent, AlertMessage, EntranceId};
use crate::infra::metrics::Metrics;
use crate::io::notifier::{AlertNotification, NotificationChannel};
use crate::services::cooldown::{CooldownStore, CooldownTracker, InMemoryCooldownStore};
use crate::services::formatter::{format_entrance_alert, mark_stale};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Successful delivery receipt
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub alert_id: String,
    pub entrance_id: EntranceId,
    pub message: AlertMessage,
    pub dispatched_at_ms: u64,
    pub latency: Duration,
}

/// Formats alerts, hands them to the channel and records cooldowns
pub struct AlertDispatcher<S: CooldownStore = InMemoryCooldownStore> {
    channel: Arc<dyn NotificationChannel>,
    cooldown: CooldownTracker<S>,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl AlertDispatcher<InMemoryCooldownStore> {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        cooldown_window: Duration,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::with_cooldown(channel, CooldownTracker::new(cooldown_window), timeout, metrics)
    }
}

impl<S: CooldownStore> AlertDispatcher<S> {
    pub fn with_cooldown(
        channel: Arc<dyn NotificationChannel>,
        cooldown: CooldownTracker<S>,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { channel, cooldown, timeout, metrics }
    }

    /// Read access for the proximity evaluator
    pub fn cooldown(&self) -> &CooldownTracker<S> {
        &self.cooldown
    }

    /// Deliver one alert and arm its cooldown on success
    pub async fn dispatch(
        &mut self,
        event: &AlertEvent,
        status: Option<&LiftStatus>,
        stale: bool,
        now_ms: u64,
    ) -> Result<Dispatched, DispatchError> {
        let notification = build_notification(event, status, stale);
        let (result, latency) =
            send_with_timeout(self.channel.clone(), notification.clone(), self.timeout).await;
        self.commit(event, notification, result, latency, now_ms)
    }

    /// Deliver all alerts produced by one location sample
    ///
    /// Sends run concurrently, one task per entrance. Each entrance appears at
    /// most once in `events`, so at most one delivery per id is in flight.
    /// Results come back in the order of `events`.
    pub async fn dispatch_batch(
        &mut self,
        events: &[AlertEvent],
        board: &StatusBoard,
        stale: bool,
        now_ms: u64,
    ) -> Vec<Result<Dispatched, DispatchError>> {
        let mut tasks = JoinSet::new();
        let mut notifications = Vec::with_capacity(events.len());

        for (index, event) in events.iter().enumerate() {
            let notification = build_notification(event, board.get(&event.tunnel_id), stale);
            notifications.push(notification.clone());
            let channel = self.channel.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let (result, latency) = send_with_timeout(channel, notification, timeout).await;
                (index, result, latency)
            });
        }

        let mut outcomes: Vec<Option<(Result<(), DispatchError>, Duration)>> =
            vec![None; events.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result, latency)) => outcomes[index] = Some((result, latency)),
                Err(e) => error!(error = %e, "dispatch_task_join_failed"),
            }
        }

        events
            .iter()
            .zip(notifications)
            .zip(outcomes)
            .map(|((event, notification), outcome)| {
                let (result, latency) = outcome.unwrap_or_else(|| {
                    (Err(DispatchError::Aborted("task panicked".to_string())), Duration::ZERO)
                });
                self.commit(event, notification, result, latency, now_ms)
            })
            .collect()
    }

    fn commit(
        &mut self,
        event: &AlertEvent,
        notification: AlertNotification,
        result: Result<(), DispatchError>,
        latency: Duration,
        now_ms: u64,
    ) -> Result<Dispatched, DispatchError> {
        let latency_ms = latency.as_millis() as u64;
        match result {
            Ok(()) => {
                self.cooldown.record_alert(&event.entrance_id, now_ms);
                self.metrics.record_dispatch(latency_ms);
                info!(
                    alert_id = %notification.id,
                    entrance = %event.entrance_id,
                    tunnel = %event.tunnel_id,
                    distance_m = format!("{:.1}", event.distance_m),
                    latency_ms = %latency_ms,
                    channel = %self.channel.name(),
                    "alert_dispatched"
                );
                Ok(Dispatched {
                    alert_id: notification.id,
                    entrance_id: event.entrance_id.clone(),
                    message: AlertMessage { title: notification.title, body: notification.body },
                    dispatched_at_ms: now_ms,
                    latency,
                })
            }
            Err(e) => {
                self.metrics.record_dispatch_failure(latency_ms);
                warn!(
                    alert_id = %notification.id,
                    entrance = %event.entrance_id,
                    error = %e,
                    latency_ms = %latency_ms,
                    channel = %self.channel.name(),
                    "alert_dispatch_failed"
                );
                Err(e)
            }
        }
    }
}

fn build_notification(
    event: &AlertEvent,
    status: Option<&LiftStatus>,
    stale: bool,
) -> AlertNotification {
    let mut message = format_entrance_alert(event.entrance_id.as_str(), event.side, status);
    // Unknown status already says so; the stale notice only qualifies real data
    if stale && status.is_some() {
        message = mark_stale(message);
    }
    AlertNotification {
        id: Uuid::now_v7().to_string(),
        entrance: event.entrance_id.clone(),
        tunnel: event.tunnel_id.clone(),
        title: message.title,
        body: message.body,
        ts: event.timestamp_ms,
    }
}

async fn send_with_timeout(
    channel: Arc<dyn NotificationChannel>,
    notification: AlertNotification,
    timeout: Duration,
) -> (Result<(), DispatchError>, Duration) {
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, channel.send(&notification)).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(timeout.as_millis() as u64)),
    };
    (result, start.elapsed())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::status::LiftState;
    use crate::domain::types::TunnelId;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    const MINUTE_MS: u64 = 60_000;

    /// Records every alert; fails while `fail` is set
    #[derive(Default)]
    pub(crate) struct RecordingChannel {
        pub sent: Mutex<Vec<AlertNotification>>,
        pub fail: AtomicBool,
        pub delay: Option<Duration>,
    }

    impl RecordingChannel {
        pub(crate) fn failing() -> Self {
            Self { fail: AtomicBool::new(true), ..Default::default() }
        }

        pub(crate) fn sent_count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn send(&self, alert: &AlertNotification) -> Result<(), DispatchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::Relaxed) {
                return Err(DispatchError::Transport("simulated outage".to_string()));
            }
            self.sent.lock().push(alert.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn event(entrance: &str, tunnel: &str, now_ms: u64) -> AlertEvent {
        AlertEvent {
            entrance_id: EntranceId::new(entrance),
            tunnel_id: TunnelId::new(tunnel),
            side: None,
            distance_m: 5.0,
            timestamp_ms: now_ms,
        }
    }

    fn dispatcher(channel: Arc<RecordingChannel>) -> AlertDispatcher {
        AlertDispatcher::new(
            channel,
            Duration::from_secs(30 * 60),
            Duration::from_millis(500),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_success_records_cooldown() {
        let channel = Arc::new(RecordingChannel::default());
        let mut dispatcher = dispatcher(channel.clone());
        let status = LiftStatus::new(LiftState::Working, LiftState::NotWorking);

        let dispatched = dispatcher
            .dispatch(&event("greenwich-north", "greenwich", 0), Some(&status), false, 0)
            .await
            .unwrap();

        assert_eq!(dispatched.message.title, "Approaching Greenwich North Foot Tunnel");
        assert_eq!(dispatched.dispatched_at_ms, 0);
        assert_eq!(channel.sent_count(), 1);
        let id = EntranceId::new("greenwich-north");
        assert_eq!(dispatcher.cooldown().last_alert(&id), Some(0));
        assert!(dispatcher.cooldown().is_on_cooldown(&id, 10 * MINUTE_MS));
    }

    #[tokio::test]
    async fn test_failure_leaves_cooldown_untouched() {
        let channel = Arc::new(RecordingChannel::failing());
        let mut dispatcher = dispatcher(channel.clone());

        let result = dispatcher.dispatch(&event("greenwich-north", "greenwich", 0), None, false, 0).await;

        assert!(matches!(result, Err(DispatchError::Transport(_))));
        assert_eq!(dispatcher.cooldown().last_alert(&EntranceId::new("greenwich-north")), None);
        assert_eq!(dispatcher.metrics.alerts_failed(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_dispatch_error() {
        let channel = Arc::new(RecordingChannel {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let mut dispatcher = dispatcher(channel);

        let result = dispatcher.dispatch(&event("woolwich-south", "woolwich", 0), None, false, 0).await;
        assert!(matches!(result, Err(DispatchError::Timeout(500))));
        assert!(!dispatcher.cooldown().is_on_cooldown(&EntranceId::new("woolwich-south"), 0));
    }

    #[tokio::test]
    async fn test_batch_uses_board_status_per_tunnel() {
        let channel = Arc::new(RecordingChannel::default());
        let mut dispatcher = dispatcher(channel.clone());
        let mut board = StatusBoard::new();
        board.apply_snapshot(
            HashMap::from([(
                TunnelId::new("greenwich"),
                LiftStatus::new(LiftState::Working, LiftState::Working),
            )]),
            0,
        );

        let events = [event("greenwich-north", "greenwich", 0), event("woolwich-north", "woolwich", 0)];
        let results = dispatcher.dispatch_batch(&events, &board, false, 0).await;

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        let second = results[1].as_ref().unwrap();
        assert_eq!(first.entrance_id.as_str(), "greenwich-north");
        assert_eq!(first.message.body, "North lift: Working\nSouth lift: Working");
        assert!(second.message.body.contains("North lift: Unknown"));
        assert_eq!(channel.sent_count(), 2);
        assert!(dispatcher.cooldown().is_on_cooldown(&EntranceId::new("woolwich-north"), 1));
    }

    #[tokio::test]
    async fn test_stale_notice_only_with_known_status() {
        let channel = Arc::new(RecordingChannel::default());
        let mut dispatcher = dispatcher(channel.clone());
        let status = LiftStatus::new(LiftState::Working, LiftState::Working);

        let with_data = dispatcher
            .dispatch(&event("greenwich-north", "greenwich", 0), Some(&status), true, 0)
            .await
            .unwrap();
        assert!(with_data.message.body.contains("last known status"));

        let without_data =
            dispatcher.dispatch(&event("woolwich-north", "woolwich", 0), None, true, 0).await.unwrap();
        assert!(!without_data.message.body.contains("last known status"));
    }
}
