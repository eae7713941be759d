//! Inbound events handled by the coordinator

use crate::domain::error::{FeedError, LocationError};
use crate::domain::status::LiftStatus;
use crate::domain::types::{LocationSample, TunnelId};
use std::collections::HashMap;

/// Everything the coordinator reacts to, in arrival order
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// One callback's worth of location fixes; only the newest is evaluated
    LocationBatch(Vec<LocationSample>),
    /// The device could not produce a fix
    LocationError(LocationError),
    /// Whole lift-status snapshot from the realtime feed
    StatusSnapshot(HashMap<TunnelId, LiftStatus>),
    /// Feed subscription failed or delivered garbage
    FeedError(FeedError),
}

impl InboundEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundEvent::LocationBatch(_) => "location_batch",
            InboundEvent::LocationError(_) => "location_error",
            InboundEvent::StatusSnapshot(_) => "status_snapshot",
            InboundEvent::FeedError(_) => "feed_error",
        }
    }
}
