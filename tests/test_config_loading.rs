//! Configuration loading and validation tests
//!
//! Observable outcomes of loading a TOML file: what ends up in the sections
//! and which files are rejected.

use betlink::config::{ClientConfig, ConfigError};
use betlink::transport::{HandleSettings, TransportKind};
use betlink::ClientLifecycle;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_config_loads_from_full_toml() {
    let file = write_config(
        r#"
[api]
base_url = "https://bets.example.com"
timeout_ms = 4000
token_file = "/tmp/betlink/token"

[socket]
url = "wss://bets.example.com/ws"
transports = ["websocket", "polling"]
handshake_timeout_ms = 3000

[socket.reconnection]
initial_delay_ms = 500
max_delay_ms = 8000
max_attempts = 6

[health]
interval_ms = 10000
retries = 0

[store]
activity_log_capacity = 16
"#,
    );

    let config = ClientConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.api.base_url, "https://bets.example.com");
    assert_eq!(config.api.timeout(), Duration::from_secs(4));
    assert_eq!(
        config.api.token_file.as_deref(),
        Some(std::path::Path::new("/tmp/betlink/token"))
    );
    assert_eq!(config.health.interval(), Duration::from_secs(10));
    assert_eq!(config.health.retries, 0);
    assert_eq!(config.store.activity_log_capacity, 16);

    let settings = HandleSettings::from(&config.socket);
    assert_eq!(
        settings.transports,
        vec![TransportKind::WebSocket, TransportKind::Polling]
    );
    assert_eq!(settings.handshake_timeout, Duration::from_secs(3));
    assert_eq!(settings.policy.initial_delay, Duration::from_millis(500));
    assert_eq!(settings.policy.max_delay, Duration::from_secs(8));
    assert_eq!(settings.policy.max_attempts, 6);
}

#[test]
fn test_empty_file_is_a_working_local_config() {
    let file = write_config("");
    let config = ClientConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn test_missing_file_is_read_error() {
    let result = ClientConfig::load_from_file(std::path::Path::new("/nonexistent/betlink.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let file = write_config("[socket\nurl = ");
    assert!(matches!(
        ClientConfig::load_from_file(file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_unknown_transport_is_parse_error() {
    let file = write_config("[socket]\ntransports = [\"carrier-pigeon\"]");
    assert!(matches!(
        ClientConfig::load_from_file(file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_inconsistent_values_fail_validation() {
    let file = write_config(
        r#"
[socket.reconnection]
initial_delay_ms = 9000
max_delay_ms = 5000
"#,
    );
    assert!(matches!(
        ClientConfig::load_from_file(file.path()),
        Err(ConfigError::InvalidConfig(_))
    ));

    let file = write_config("[socket]\nurl = \"ftp://bets.example.com\"");
    assert!(matches!(
        ClientConfig::load_from_file(file.path()),
        Err(ConfigError::InvalidUrl {
            field: "socket.url",
            ..
        })
    ));
}

#[test]
fn test_excess_health_retries_fail_validation() {
    let file = write_config("[health]\nretries = 5");
    assert!(matches!(
        ClientConfig::load_from_file(file.path()),
        Err(ConfigError::InvalidConfig(message)) if message.contains("health.retries")
    ));
}

#[test]
fn test_loaded_config_builds_client() {
    let file = write_config("[store]\nactivity_log_capacity = 3");
    let config = ClientConfig::load_from_file(file.path()).unwrap();

    let client = ClientLifecycle::from_config(config).unwrap();

    assert_eq!(client.store().snapshot().activity_log.capacity(), 3);
    assert!(client.state_machine().is_attached());
}
