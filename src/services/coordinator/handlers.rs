//! Event handlers for the Coordinator

use super::{Coordinator, Outage};
use crate::domain::error::{DispatchError, FeedError, LocationError};
use crate::domain::geo::distance_m;
use crate::domain::status::LiftStatus;
use crate::domain::types::{GeoPoint, LocationSample, TunnelId};
use crate::services::dispatcher::Dispatched;
use crate::services::proximity::evaluate_detailed;
use std::collections::HashMap;
use tracing::{debug, info, warn};

impl Coordinator {
    /// Evaluate the newest sample of a batch and dispatch what it triggers
    pub(crate) async fn handle_location_batch(
        &mut self,
        samples: Vec<LocationSample>,
        now_ms: u64,
    ) -> Vec<Result<Dispatched, DispatchError>> {
        self.metrics.record_location_batch();

        // Newest by device timestamp; on ties the later entry in the batch wins
        let Some(sample) = samples.into_iter().max_by_key(|s| s.timestamp_ms) else {
            return Vec::new();
        };

        if self.location_outage.take().is_some() {
            info!("location_recovered");
        }

        // Samples at an entrance always reach the evaluator
        let at_entrance = self.is_within_trigger_radius(sample.point);
        if !self.throttle.admit(sample.point, now_ms) && !at_entrance {
            self.metrics.record_sample_throttled();
            debug!(
                lat = %sample.point.latitude,
                lon = %sample.point.longitude,
                "sample_throttled"
            );
            return Vec::new();
        }
        self.metrics.record_sample_evaluated();

        let evaluation = evaluate_detailed(
            sample.point,
            self.config.entrances(),
            self.dispatcher.cooldown(),
            now_ms,
            self.config.trigger_radius_m(),
        );
        if evaluation.suppressed > 0 {
            self.metrics.record_alerts_suppressed(evaluation.suppressed as u64);
            debug!(suppressed = %evaluation.suppressed, "alerts_suppressed_by_cooldown");
        }
        if evaluation.eligible.is_empty() {
            return Vec::new();
        }

        let stale = self.feed_outage.is_some();
        self.dispatcher
            .dispatch_batch(&evaluation.eligible, &self.board, stale, now_ms)
            .await
    }

    fn is_within_trigger_radius(&self, point: GeoPoint) -> bool {
        let radius_m = self.config.trigger_radius_m();
        self.config.entrances().iter().any(|e| distance_m(point, e.location) <= radius_m)
    }

    pub(crate) fn handle_location_error(&mut self, error: LocationError, now_ms: u64) {
        self.metrics.record_location_error();
        warn!(error = %error, "location_error");
        match &mut self.location_outage {
            Some(outage) => outage.error = error,
            None => self.location_outage = Some(Outage { error, since_ms: now_ms }),
        }
    }

    pub(crate) fn handle_status_snapshot(
        &mut self,
        snapshot: HashMap<TunnelId, LiftStatus>,
        now_ms: u64,
    ) {
        self.metrics.record_feed_snapshot();
        if let Some(outage) = self.feed_outage.take() {
            info!(
                down_ms = %now_ms.saturating_sub(outage.since_ms),
                "feed_recovered"
            );
        }
        info!(tunnels = %snapshot.len(), "feed_snapshot");
        self.board.apply_snapshot(snapshot, now_ms);
    }

    /// Keep the last-known board; the view turns stale
    pub(crate) fn handle_feed_error(&mut self, error: FeedError, now_ms: u64) {
        self.metrics.record_feed_error();
        warn!(error = %error, has_data = %self.board.has_data(), "feed_error");
        match &mut self.feed_outage {
            Some(outage) => outage.error = error,
            None => self.feed_outage = Some(Outage { error, since_ms: now_ms }),
        }
    }
}
