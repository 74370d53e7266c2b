//! Client configuration
//!
//! Loaded from a TOML file where every section is optional, then overlaid with
//! environment variables. An empty file yields a working local configuration.

use crate::transport::{ReconnectPolicy, TransportKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const ENV_API_URL: &str = "BETLINK_API_URL";
pub const ENV_WS_URL: &str = "BETLINK_WS_URL";
pub const ENV_HEALTH_INTERVAL_MS: &str = "BETLINK_HEALTH_INTERVAL_MS";
pub const ENV_ACTIVITY_LOG_CAPACITY: &str = "BETLINK_ACTIVITY_LOG_CAPACITY";

/// Backend endpoint paths
pub mod endpoints {
    pub const HEALTH_CHECK: &str = "/health_check";
    pub const BETS: &str = "/bets";
    pub const REGISTER: &str = "/register";
    pub const LOGIN: &str = "/login";
    pub const EVENTS_POLL: &str = "/events/poll";
}

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub socket: SocketSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// HTTP API section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSection {
    /// Base URL of the backend HTTP surface
    #[serde(default = "default_api_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds (default: 10000)
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
    /// File holding the bearer token, if any
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            timeout_ms: default_api_timeout_ms(),
            token_file: None,
        }
    }
}

impl ApiSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Persistent channel section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocketSection {
    /// WebSocket URL of the event channel
    #[serde(default = "default_socket_url")]
    pub url: String,
    /// Long-poll URL for the fallback transport (derived from `url` when absent)
    #[serde(default)]
    pub polling_url: Option<String>,
    /// Transports in order of preference
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportKind>,
    /// Time allowed for a single handshake, in milliseconds
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Server hold time for one long-poll request, in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default)]
    pub reconnection: ReconnectionSection,
}

impl Default for SocketSection {
    fn default() -> Self {
        Self {
            url: default_socket_url(),
            polling_url: None,
            transports: default_transports(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            reconnection: ReconnectionSection::default(),
        }
    }
}

impl SocketSection {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnection.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnection.max_delay_ms),
            max_attempts: self.reconnection.max_attempts,
        }
    }

    /// Resolve the long-poll URL, deriving `http(s)://host:port/events/poll` from the socket URL
    pub fn resolve_polling_url(&self) -> Result<Url, ConfigError> {
        if let Some(explicit) = &self.polling_url {
            return parse_url("socket.polling_url", explicit);
        }

        let mut url = parse_url("socket.url", &self.url)?;
        let scheme = match url.scheme() {
            "wss" | "https" => "https",
            _ => "http",
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::InvalidUrl {
                field: "socket.url",
                value: self.url.clone(),
            })?;
        url.set_path(endpoints::EVENTS_POLL);
        url.set_query(None);
        Ok(url)
    }
}

/// Reconnection schedule for the persistent channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectionSection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Automatic attempts before giving up (0 disables automatic retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectionSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Reachability polling section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    /// Polling cadence in milliseconds (default: 30000)
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    /// Immediate retries per scheduled probe, 0 or 1 (default: 1)
    #[serde(default = "default_health_retries")]
    pub retries: u32,
    /// Timeout of a single probe in milliseconds
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
            retries: default_health_retries(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl HealthSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Application store section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    #[serde(default = "default_activity_log_capacity")]
    pub activity_log_capacity: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            activity_log_capacity: default_activity_log_capacity(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_timeout_ms() -> u64 {
    10_000
}

fn default_socket_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_transports() -> Vec<TransportKind> {
    vec![TransportKind::WebSocket, TransportKind::Polling]
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}

fn default_poll_timeout_ms() -> u64 {
    25_000
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_health_interval_ms() -> u64 {
    30_000
}

/// Upper bound for `health.retries`
pub const MAX_HEALTH_RETRIES: u32 = 1;

fn default_health_retries() -> u32 {
    1
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_activity_log_capacity() -> usize {
    8
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid URL in {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })
}

impl ClientConfig {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ClientConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            self.socket.url = url;
        }
        if let Some(raw) = lookup(ENV_HEALTH_INTERVAL_MS) {
            self.health.interval_ms =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvVar {
                        name: ENV_HEALTH_INTERVAL_MS,
                        value: raw.clone(),
                    })?;
        }
        if let Some(raw) = lookup(ENV_ACTIVITY_LOG_CAPACITY) {
            self.store.activity_log_capacity =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvVar {
                        name: ENV_ACTIVITY_LOG_CAPACITY,
                        value: raw.clone(),
                    })?;
        }
        Ok(())
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("api.base_url", &self.api.base_url)?;
        let socket_url = parse_url("socket.url", &self.socket.url)?;
        if !matches!(socket_url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                field: "socket.url",
                value: self.socket.url.clone(),
            });
        }
        self.socket.resolve_polling_url()?;

        if self.socket.transports.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "socket.transports must name at least one transport".to_string(),
            ));
        }
        self.socket
            .reconnect_policy()
            .validate()
            .map_err(ConfigError::InvalidConfig)?;
        if self.health.interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "health.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.health.retries > MAX_HEALTH_RETRIES {
            return Err(ConfigError::InvalidConfig(format!(
                "health.retries must be at most {MAX_HEALTH_RETRIES}"
            )));
        }
        if self.store.activity_log_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "store.activity_log_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
