//! Observability: structured logging and span helpers

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{health_span, lifecycle_span, router_span, transport_span};
