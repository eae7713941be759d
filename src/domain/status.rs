//! Lift status model fed by the realtime status feed
//!
//! The feed publishes whole snapshots shaped as
//! `{ "<tunnel>": { "north": bool, "south": bool } }`. Anything the feed does
//! not mention is `Unknown`, never `NotWorking`.

use crate::domain::types::{Side, TunnelId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tri-state lift condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftState {
    Working,
    NotWorking,
    #[default]
    Unknown,
}

impl LiftState {
    /// Human-readable label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            LiftState::Working => "Working",
            LiftState::NotWorking => "Not working",
            LiftState::Unknown => "Unknown",
        }
    }
}

impl From<Option<bool>> for LiftState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => LiftState::Working,
            Some(false) => LiftState::NotWorking,
            None => LiftState::Unknown,
        }
    }
}

/// Lift state for both sides of one tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LiftStatus {
    pub north: LiftState,
    pub south: LiftState,
}

impl LiftStatus {
    pub fn new(north: LiftState, south: LiftState) -> Self {
        Self { north, south }
    }

    pub fn side(&self, side: Side) -> LiftState {
        match side {
            Side::North => self.north,
            Side::South => self.south,
        }
    }
}

/// Wire shape of one tunnel entry in a feed snapshot
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawLiftStatus {
    #[serde(default)]
    pub north: Option<bool>,
    #[serde(default)]
    pub south: Option<bool>,
}

impl From<RawLiftStatus> for LiftStatus {
    fn from(raw: RawLiftStatus) -> Self {
        Self { north: raw.north.into(), south: raw.south.into() }
    }
}

/// Latest known lift status for every tunnel the feed has reported
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    tunnels: HashMap<TunnelId, LiftStatus>,
    /// Epoch ms of the last snapshot applied, None until the first one
    updated_at_ms: Option<u64>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the board with a fresh feed snapshot
    pub fn apply_snapshot(&mut self, snapshot: HashMap<TunnelId, LiftStatus>, now_ms: u64) {
        self.tunnels = snapshot;
        self.updated_at_ms = Some(now_ms);
    }

    /// Status for a tunnel, None if the feed has not reported it
    pub fn get(&self, tunnel: &TunnelId) -> Option<&LiftStatus> {
        self.tunnels.get(tunnel)
    }

    pub fn updated_at_ms(&self) -> Option<u64> {
        self.updated_at_ms
    }

    pub fn has_data(&self) -> bool {
        self.updated_at_ms.is_some()
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }
}

/// Availability of lift-status data as presented to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// No snapshot and no error yet
    #[default]
    Loading,
    /// Feed connected and data current
    Live,
    /// Feed errored; showing last-known data
    Stale,
    /// Feed or location errors persisted past the configured threshold
    Unavailable,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Loading => "loading",
            Availability::Live => "live",
            Availability::Stale => "stale",
            Availability::Unavailable => "unavailable",
        }
    }
}

/// Per-tunnel row of the status view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunnelView {
    pub id: TunnelId,
    pub label: String,
    /// None when the feed has not reported this tunnel yet
    pub lifts: Option<LiftStatus>,
}

/// Snapshot of everything the UI collaborator needs to render
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusView {
    pub availability: Availability,
    pub tunnels: Vec<TunnelView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lift_state_from_option() {
        assert_eq!(LiftState::from(Some(true)), LiftState::Working);
        assert_eq!(LiftState::from(Some(false)), LiftState::NotWorking);
        assert_eq!(LiftState::from(None), LiftState::Unknown);
    }

    #[test]
    fn test_raw_status_missing_side_is_unknown() {
        let raw: RawLiftStatus = serde_json::from_str(r#"{"north": true}"#).unwrap();
        let status = LiftStatus::from(raw);
        assert_eq!(status.north, LiftState::Working);
        assert_eq!(status.south, LiftState::Unknown);
        assert_eq!(status.side(Side::South), LiftState::Unknown);
    }

    #[test]
    fn test_board_replaced_by_snapshot() {
        let mut board = StatusBoard::new();
        assert!(!board.has_data());

        let greenwich = TunnelId::new("greenwich");
        let woolwich = TunnelId::new("woolwich");
        board.apply_snapshot(
            HashMap::from([
                (greenwich.clone(), LiftStatus::new(LiftState::Working, LiftState::Working)),
                (woolwich.clone(), LiftStatus::new(LiftState::NotWorking, LiftState::Working)),
            ]),
            1_000,
        );
        assert_eq!(board.len(), 2);
        assert_eq!(board.updated_at_ms(), Some(1_000));

        // A later snapshot without woolwich drops it back to unknown
        board.apply_snapshot(
            HashMap::from([(greenwich.clone(), LiftStatus::default())]),
            2_000,
        );
        assert!(board.get(&woolwich).is_none());
        assert_eq!(board.get(&greenwich), Some(&LiftStatus::default()));
    }

    #[test]
    fn test_status_view_serialization() {
        let view = StatusView {
            availability: Availability::Stale,
            tunnels: vec![TunnelView {
                id: TunnelId::new("greenwich"),
                label: "Greenwich Foot Tunnel".to_string(),
                lifts: Some(LiftStatus::new(LiftState::Working, LiftState::NotWorking)),
            }],
            updated_at_ms: Some(42),
            feed_error: Some("connection refused".to_string()),
            location_error: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["availability"], "stale");
        assert_eq!(json["tunnels"][0]["lifts"]["south"], "not_working");
        assert!(json.get("location_error").is_none());
    }
}
