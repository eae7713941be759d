//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Entrances are only ever read from the file. Defaults carry none, so a
//! missing file fails validation before any evaluation begins.

use crate::domain::error::ConfigError;
use crate::domain::types::{Entrance, Side, TunnelId};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    /// Publish alerts to an MQTT topic (QoS 1)
    Mqtt,
    /// POST alerts as JSON to a webhook
    Http,
}

impl NotifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyMode::Mqtt => "mqtt",
            NotifyMode::Http => "http",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "tunnel-lifts".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_mqtt_client_id(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "tunnel-lifts".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Topic carrying whole lift-status snapshots
    #[serde(default = "default_feed_topic")]
    pub topic: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { topic: default_feed_topic() }
    }
}

fn default_feed_topic() -> String {
    "tunnels/lift-status".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Topic carrying location sample batches from the device
    #[serde(default = "default_location_topic")]
    pub topic: String,
    /// Minimum movement before a new sample is evaluated (0 disables)
    #[serde(default = "default_distance_interval_m")]
    pub distance_interval_m: f64,
    /// Maximum time between evaluated samples (0 disables)
    #[serde(default = "default_time_interval_secs")]
    pub time_interval_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            topic: default_location_topic(),
            distance_interval_m: default_distance_interval_m(),
            time_interval_secs: default_time_interval_secs(),
        }
    }
}

fn default_location_topic() -> String {
    "tunnels/location".to_string()
}

fn default_distance_interval_m() -> f64 {
    100.0
}

fn default_time_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    #[serde(default = "default_trigger_radius_m")]
    pub trigger_radius_m: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self { trigger_radius_m: default_trigger_radius_m(), cooldown_secs: default_cooldown_secs() }
    }
}

fn default_trigger_radius_m() -> f64 {
    30.0
}

fn default_cooldown_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_mode")]
    pub mode: NotifyMode,
    /// MQTT topic for alerts (mqtt mode)
    #[serde(default = "default_notify_topic")]
    pub topic: String,
    /// Webhook URL (http mode), credentials may be embedded as user:pass@host
    #[serde(default)]
    pub http_url: String,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mode: default_notify_mode(),
            topic: default_notify_topic(),
            http_url: String::new(),
            timeout_ms: default_notify_timeout_ms(),
        }
    }
}

fn default_notify_mode() -> NotifyMode {
    NotifyMode::Mqtt
}

fn default_notify_topic() -> String {
    "tunnels/alerts".to_string()
}

fn default_notify_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_tick_secs")]
    pub tick_secs: u64,
    /// How long feed/location errors may persist before the view goes unavailable
    #[serde(default = "default_unavailable_after_secs")]
    pub unavailable_after_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_health_tick_secs(),
            unavailable_after_secs: default_unavailable_after_secs(),
        }
    }
}

fn default_health_tick_secs() -> u64 {
    5
}

fn default_unavailable_after_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Status/metrics HTTP port (0 to disable)
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_http_port() }
    }
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntranceConfig {
    pub id: String,
    pub tunnel: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub side: Option<Side>,
}

impl EntranceConfig {
    fn into_entrance(self) -> Entrance {
        // "greenwich-north" implies the north side when not given explicitly
        let side = self.side.or_else(|| {
            if self.id.ends_with("north") {
                Some(Side::North)
            } else if self.id.ends_with("south") {
                Some(Side::South)
            } else {
                None
            }
        });
        let entrance = Entrance::new(&self.id, &self.tunnel, self.latitude, self.longitude);
        match side {
            Some(side) => entrance.with_side(side),
            None => entrance,
        }
    }
}

/// TOML file structure
#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    site: SiteConfig,
    #[serde(default)]
    mqtt: MqttConfig,
    #[serde(default)]
    feed: FeedConfig,
    #[serde(default)]
    location: LocationConfig,
    #[serde(default)]
    geofence: GeofenceConfig,
    #[serde(default)]
    notify: NotifyConfig,
    #[serde(default)]
    health: HealthConfig,
    #[serde(default)]
    http: HttpConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    entrances: Vec<EntranceConfig>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_client_id: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    feed_topic: String,
    location_topic: String,
    distance_interval_m: f64,
    time_interval_secs: u64,
    trigger_radius_m: f64,
    cooldown_secs: u64,
    notify_mode: NotifyMode,
    notify_topic: String,
    notify_http_url: String,
    notify_timeout_ms: u64,
    health_tick_secs: u64,
    unavailable_after_secs: u64,
    http_port: u16,
    metrics_interval_secs: u64,
    entrances: Vec<Entrance>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_client_id: toml_config.mqtt.client_id,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            feed_topic: toml_config.feed.topic,
            location_topic: toml_config.location.topic,
            distance_interval_m: toml_config.location.distance_interval_m,
            time_interval_secs: toml_config.location.time_interval_secs,
            trigger_radius_m: toml_config.geofence.trigger_radius_m,
            cooldown_secs: toml_config.geofence.cooldown_secs,
            notify_mode: toml_config.notify.mode,
            notify_topic: toml_config.notify.topic,
            notify_http_url: toml_config.notify.http_url,
            notify_timeout_ms: toml_config.notify.timeout_ms,
            health_tick_secs: toml_config.health.tick_secs,
            unavailable_after_secs: toml_config.health.unavailable_after_secs,
            http_port: toml_config.http.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            entrances: toml_config
                .entrances
                .into_iter()
                .map(EntranceConfig::into_entrance)
                .collect(),
            config_file,
        }
    }

    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let toml_config: TomlConfig = toml::from_str(&content).map_err(|source| {
            ConfigError::Parse { path: path.display().to_string(), source }
        })?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults only when the file is missing
    ///
    /// The fallback still goes through validation, so a deployment without
    /// entrances fails here rather than running silently.
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                warn!(path = %path, "config_file_not_found_using_defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Check entrance list and numeric parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entrances.is_empty() {
            return Err(ConfigError::NoEntrances);
        }

        let mut seen = FxHashSet::default();
        for (index, entrance) in self.entrances.iter().enumerate() {
            if entrance.id.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyEntranceId { index });
            }
            if entrance.tunnel_id.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyTunnelId { id: entrance.id.clone() });
            }
            if !entrance.location.is_valid() {
                return Err(ConfigError::InvalidCoordinates {
                    id: entrance.id.clone(),
                    latitude: entrance.location.latitude,
                    longitude: entrance.location.longitude,
                });
            }
            if !seen.insert(&entrance.id) {
                return Err(ConfigError::DuplicateEntrance { id: entrance.id.clone() });
            }
        }

        if !(self.trigger_radius_m.is_finite() && self.trigger_radius_m > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "geofence.trigger_radius_m",
                reason: format!("must be a positive number, got {}", self.trigger_radius_m),
            });
        }
        if self.cooldown_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "geofence.cooldown_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(self.distance_interval_m.is_finite() && self.distance_interval_m >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "location.distance_interval_m",
                reason: format!("must be zero or positive, got {}", self.distance_interval_m),
            });
        }
        if self.notify_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notify.timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.notify_mode == NotifyMode::Http && self.notify_http_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "notify.http_url",
                reason: "required when notify.mode = \"http\"".to_string(),
            });
        }
        if self.health_tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "health.tick_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Distinct tunnel ids in configuration order
    pub fn tunnel_ids(&self) -> Vec<TunnelId> {
        let mut tunnels: Vec<TunnelId> = Vec::new();
        for entrance in &self.entrances {
            if !tunnels.contains(&entrance.tunnel_id) {
                tunnels.push(entrance.tunnel_id.clone());
            }
        }
        tunnels
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn feed_topic(&self) -> &str {
        &self.feed_topic
    }

    pub fn location_topic(&self) -> &str {
        &self.location_topic
    }

    pub fn distance_interval_m(&self) -> f64 {
        self.distance_interval_m
    }

    pub fn time_interval(&self) -> Duration {
        Duration::from_secs(self.time_interval_secs)
    }

    pub fn trigger_radius_m(&self) -> f64 {
        self.trigger_radius_m
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn notify_mode(&self) -> NotifyMode {
        self.notify_mode
    }

    pub fn notify_topic(&self) -> &str {
        &self.notify_topic
    }

    pub fn notify_http_url(&self) -> &str {
        &self.notify_http_url
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn health_tick(&self) -> Duration {
        Duration::from_secs(self.health_tick_secs)
    }

    pub fn unavailable_after(&self) -> Duration {
        Duration::from_secs(self.unavailable_after_secs)
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn entrances(&self) -> &[Entrance] {
        &self.entrances
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests and tools to set the entrance list
    pub fn with_entrances(mut self, entrances: Vec<Entrance>) -> Self {
        self.entrances = entrances;
        self
    }

    /// Builder method for tests to set the geofence parameters
    pub fn with_geofence(mut self, trigger_radius_m: f64, cooldown: Duration) -> Self {
        self.trigger_radius_m = trigger_radius_m;
        self.cooldown_secs = cooldown.as_secs();
        self
    }

    /// Builder method for tests to set the sample throttle
    pub fn with_sampling(mut self, distance_interval_m: f64, time_interval: Duration) -> Self {
        self.distance_interval_m = distance_interval_m;
        self.time_interval_secs = time_interval.as_secs();
        self
    }

    /// Builder method for tests to set the unavailable threshold
    pub fn with_unavailable_after(mut self, after: Duration) -> Self {
        self.unavailable_after_secs = after.as_secs();
        self
    }
}
