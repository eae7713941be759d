//! Event coordination
//!
//! The Coordinator is the single owner of mutable state:
//! - Lift status board (last-known snapshot from the feed)
//! - Alert dispatcher and the cooldown state behind it
//! - Location sample throttle
//! - Feed/location error state and the status view published to the UI
//!
//! Events arrive on one channel and are handled to completion in order, so
//! two samples can never race on the same entrance's cooldown.

mod handlers;

use crate::domain::error::{DispatchError, FeedError, LocationError};
use crate::domain::events::InboundEvent;
use crate::domain::status::{Availability, StatusBoard, StatusView, TunnelView};
use crate::domain::types::{epoch_ms, Entrance};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::notifier::NotificationChannel;
use crate::services::dispatcher::{AlertDispatcher, Dispatched};
use crate::services::formatter::tunnel_label;
use crate::services::throttle::SampleThrottle;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::info;

/// An error condition and the epoch ms it was first seen
#[derive(Debug, Clone)]
pub(crate) struct Outage<E> {
    pub(crate) error: E,
    pub(crate) since_ms: u64,
}

/// Single-threaded event processor for proximity alerts
pub struct Coordinator {
    /// Application configuration
    pub(crate) config: Config,
    /// Last-known lift status per tunnel
    pub(crate) board: StatusBoard,
    /// Formats and delivers alerts; sole writer of cooldown state
    pub(crate) dispatcher: AlertDispatcher,
    /// Distance/time filter on incoming samples
    pub(crate) throttle: SampleThrottle,
    pub(crate) metrics: Arc<Metrics>,
    /// Set while the feed is down; cleared by the next snapshot
    pub(crate) feed_outage: Option<Outage<FeedError>>,
    /// Set while the device reports errors; cleared by the next usable batch
    pub(crate) location_outage: Option<Outage<LocationError>>,
    view_tx: watch::Sender<StatusView>,
}

impl Coordinator {
    pub fn new(config: Config, channel: Arc<dyn NotificationChannel>, metrics: Arc<Metrics>) -> Self {
        let dispatcher = AlertDispatcher::new(
            channel,
            config.cooldown(),
            config.notify_timeout(),
            metrics.clone(),
        );
        let throttle = SampleThrottle::new(config.distance_interval_m(), config.time_interval());
        let (view_tx, _) = watch::channel(StatusView::default());

        let coordinator = Self {
            config,
            board: StatusBoard::new(),
            dispatcher,
            throttle,
            metrics,
            feed_outage: None,
            location_outage: None,
            view_tx,
        };
        coordinator.publish_view(epoch_ms());
        coordinator
    }

    /// Receiver for the status view, updated after every event and tick
    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.view_tx.subscribe()
    }

    pub fn entrances(&self) -> &[Entrance] {
        self.config.entrances()
    }

    /// Consume events until the channel closes
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<InboundEvent>) {
        let mut health_tick = interval(self.config.health_tick());

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(e) => {
                            self.process_event(e, epoch_ms()).await;
                        }
                        None => break,
                    }
                }
                _ = health_tick.tick() => {
                    self.tick(epoch_ms());
                }
            }
        }

        info!("coordinator_stopped");
    }

    /// Handle one event; returns the dispatch outcomes it produced
    pub async fn process_event(
        &mut self,
        event: InboundEvent,
        now_ms: u64,
    ) -> Vec<Result<Dispatched, DispatchError>> {
        let outcomes = match event {
            InboundEvent::LocationBatch(samples) => {
                self.handle_location_batch(samples, now_ms).await
            }
            InboundEvent::LocationError(error) => {
                self.handle_location_error(error, now_ms);
                Vec::new()
            }
            InboundEvent::StatusSnapshot(snapshot) => {
                self.handle_status_snapshot(snapshot, now_ms);
                Vec::new()
            }
            InboundEvent::FeedError(error) => {
                self.handle_feed_error(error, now_ms);
                Vec::new()
            }
        };

        self.publish_view(now_ms);
        outcomes
    }

    /// Periodic health check: escalates long outages to `Unavailable`
    pub fn tick(&mut self, now_ms: u64) {
        self.publish_view(now_ms);
    }

    /// Availability of lift-status data at `now_ms`
    pub fn availability(&self, now_ms: u64) -> Availability {
        let limit_ms = self.config.unavailable_after().as_millis() as u64;
        let persisted = |since_ms: u64| now_ms.saturating_sub(since_ms) >= limit_ms;

        let feed_down = self.feed_outage.as_ref().map(|o| persisted(o.since_ms));
        let location_down =
            self.location_outage.as_ref().is_some_and(|o| persisted(o.since_ms));

        match feed_down {
            Some(true) => Availability::Unavailable,
            _ if location_down => Availability::Unavailable,
            Some(false) => Availability::Stale,
            None if self.board.has_data() => Availability::Live,
            None => Availability::Loading,
        }
    }

    /// Build the view the UI renders: one row per configured tunnel
    pub fn status_view(&self, now_ms: u64) -> StatusView {
        let tunnels = self
            .config
            .tunnel_ids()
            .into_iter()
            .map(|id| TunnelView {
                label: tunnel_label(id.as_str()),
                lifts: self.board.get(&id).copied(),
                id,
            })
            .collect();

        StatusView {
            availability: self.availability(now_ms),
            tunnels,
            updated_at_ms: self.board.updated_at_ms(),
            feed_error: self.feed_outage.as_ref().map(|o| o.error.to_string()),
            location_error: self.location_outage.as_ref().map(|o| o.error.to_string()),
        }
    }

    fn publish_view(&self, now_ms: u64) {
        let view = self.status_view(now_ms);
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}
