//! IO modules - external system interfaces
//!
//! - `mqtt` - MQTT client for the lift-status feed and location samples
//! - `notifier` - notification channels (MQTT publish, HTTP webhook)
//! - `status_api` - status/metrics HTTP endpoint

pub mod mqtt;
pub mod notifier;
pub mod status_api;

// Re-export commonly used types
pub use mqtt::start_mqtt_client;
pub use notifier::{build_channel, AlertNotification, NotificationChannel};
pub use status_api::start_status_server;
