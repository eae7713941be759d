//! Domain models - core types shared by every layer
//!
//! - `types` - entrances, coordinates, alert events and messages
//! - `geo` - great-circle distance
//! - `status` - tri-state lift status, status board and UI view
//! - `error` - error taxonomy (config, feed, location, dispatch)
//! - `events` - inbound events consumed by the coordinator

pub mod error;
pub mod events;
pub mod geo;
pub mod status;
pub mod types;

pub use error::{ConfigError, DispatchError, FeedError, LocationError};
pub use events::InboundEvent;
pub use status::{Availability, LiftState, LiftStatus, StatusBoard, StatusView, TunnelView};
pub use types::{
    AlertEvent, AlertMessage, Entrance, EntranceId, GeoPoint, LocationSample, Side, TunnelId,
};
