//! Error taxonomy
//!
//! Only `ConfigError` is fatal. Feed, location and dispatch errors are
//! recovered by the coordinator: logged, counted, and the operation skipped.

use crate::domain::types::EntranceId;
use thiserror::Error;

/// Malformed configuration detected at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("no entrances configured")]
    NoEntrances,

    #[error("entrance #{index} has an empty id")]
    EmptyEntranceId { index: usize },

    #[error("entrance {id} has an empty tunnel id")]
    EmptyTunnelId { id: EntranceId },

    #[error("duplicate entrance id {id}")]
    DuplicateEntrance { id: EntranceId },

    #[error("entrance {id} has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { id: EntranceId, latitude: f64, longitude: f64 },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Realtime status feed failed or delivered something unusable
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("status feed disconnected: {0}")]
    Disconnected(String),

    #[error("malformed status snapshot: {0}")]
    Malformed(String),
}

/// A location sample could not be obtained
#[derive(Debug, Clone, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("malformed location payload: {0}")]
    Malformed(String),

    #[error("location batch contained no samples")]
    Empty,
}

/// Notification delivery failed; cooldown is not recorded
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("notification channel rejected alert: {0}")]
    Rejected(String),

    #[error("notification channel unreachable: {0}")]
    Transport(String),

    #[error("notification timed out after {0} ms")]
    Timeout(u64),

    #[error("dispatch task aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::DuplicateEntrance { id: EntranceId::new("greenwich-north") };
        assert_eq!(err.to_string(), "duplicate entrance id greenwich-north");

        assert_eq!(DispatchError::Timeout(2000).to_string(), "notification timed out after 2000 ms");
        assert_eq!(LocationError::PermissionDenied.to_string(), "location permission denied");
    }
}
