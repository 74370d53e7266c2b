//! Structured logging for the client
//!
//! `tracing` events everywhere, rendered by `tracing-subscriber` in one of
//! three formats selected through the environment:
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG, TRACE (default INFO)
//! - `LOG_FORMAT`: `json` (default), `pretty`, `compact`
//! - `LOG_SPANS`: `true` to log span open/close events
//! - `RUST_LOG`: replaces the computed filter entirely
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG betlink run
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies whose chatter is capped at `warn`
const NOISY_TARGETS: [&str; 5] = [
    "hyper=warn",
    "reqwest=warn",
    "tungstenite=warn",
    "tokio_tungstenite=warn",
    "tokio=warn",
];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Machine-readable, one JSON object per line
    Json,
    /// Multi-line, coloured
    Pretty,
    /// Single-line, coloured, no targets
    Compact,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to JSON
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Parse a level name; unknown names fall back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" | "WARNING" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

fn parse_flag(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("true")
}

/// Filter for `level` with dependency noise reduced, unless `rust_log` overrides it
pub fn build_filter(level: Level, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log {
        return EnvFilter::new(directives);
    }
    NOISY_TARGETS
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::new(level.to_string()), EnvFilter::add_directive)
}

fn span_events(include_spans: bool) -> FmtSpan {
    if include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Install the global subscriber; returns `false` if one was already set
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) -> bool {
    let rust_log = env::var("RUST_LOG").ok();
    let filter = build_filter(level, rust_log.as_deref());
    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(span_events(include_spans)),
            )
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_span_events(span_events(include_spans)),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(span_events(include_spans)),
            )
            .try_init(),
    };
    result.is_ok()
}

/// Install the global subscriber from `LOG_LEVEL`, `LOG_FORMAT` and `LOG_SPANS`
pub fn init_default_logging() -> bool {
    let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_default());
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
    let include_spans = parse_flag(&env::var("LOG_SPANS").unwrap_or_default());
    init_logging(level, format, include_spans)
}

/// Span around transport lifecycle work
#[macro_export]
macro_rules! transport_span {
    ($($field:tt)*) => {
        tracing::info_span!("transport", $($field)*)
    };
}

/// Span around a reachability probe
#[macro_export]
macro_rules! health_span {
    ($($field:tt)*) => {
        tracing::debug_span!("health_probe", $($field)*)
    };
}

/// Span around inbound event dispatch
#[macro_export]
macro_rules! router_span {
    ($($field:tt)*) => {
        tracing::debug_span!("event_dispatch", $($field)*)
    };
}

/// Span around client start-up and shutdown
#[macro_export]
macro_rules! lifecycle_span {
    ($($field:tt)*) => {
        tracing::info_span!("client_lifecycle", $($field)*)
    };
}

pub use {health_span, lifecycle_span, router_span, transport_span};
