//! Tests for logging configuration and format parsing

use betlink::observability::logging::{build_filter, parse_level, LogFormat};
use betlink::observability::{init_logging, lifecycle_span, transport_span};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_insensitive() {
    assert_eq!(LogFormat::parse("Json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
}

#[test]
fn test_log_format_unknown_defaults_to_json() {
    // JSON is the production default
    for input in ["", "xml", "123", "plain"] {
        assert_eq!(LogFormat::parse(input), LogFormat::Json, "input: {input}");
    }
}

#[test]
fn test_log_level_parsing_falls_back_to_info() {
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level("nonsense"), Level::INFO);
}

#[test]
fn test_build_filter_caps_dependency_noise() {
    let filter = build_filter(Level::DEBUG, None).to_string();
    assert!(filter.contains("debug"));
    assert!(filter.contains("tungstenite=warn"));
    assert!(filter.contains("reqwest=warn"));
}

#[test]
fn test_rust_log_replaces_computed_filter() {
    let filter = build_filter(Level::INFO, Some("betlink=trace")).to_string();
    assert_eq!(filter, "betlink=trace");
}

#[test]
fn test_init_logging_only_installs_once() {
    init_logging(Level::INFO, LogFormat::Compact, false);
    // A subscriber is installed by now, whoever won
    assert!(!init_logging(Level::INFO, LogFormat::Json, true));
}

#[test]
fn test_span_macros_accept_fields() {
    let span = transport_span!(transport = "websocket", attempt = 2);
    let _entered = span.enter();
    let _lifecycle = lifecycle_span!(phase = "test").entered();
}
