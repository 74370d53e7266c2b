//! Crate-level error type and message sanitisation
//!
//! Each layer has its own `thiserror` enum; [`ClientError`] wraps them for the
//! composition root and the CLI. Transport failures are normally observed
//! through connection state rather than returned.

use crate::api::{ApiError, TokenStoreError};
use crate::config::ConfigError;
use crate::protocol::EventDecodeError;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const MAX_MESSAGE_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

// `None` only if a pattern fails to compile; that pattern is then skipped.
static SECRET_ASSIGNMENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").ok());

static BEARER_TOKEN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*").ok());

static SENSITIVE_PATH: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+").ok()
});

fn redact(pattern: &Lazy<Option<Regex>>, input: String, replacement: &str) -> String {
    match pattern.as_ref() {
        Some(regex) => regex.replace_all(&input, replacement).into_owned(),
        None => input,
    }
}

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Event decode error: {0}")]
    Decode(#[from] EventDecodeError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Token storage error: {0}")]
    TokenStore(#[from] TokenStoreError),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Display text safe to log or print
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Config(_) | ClientError::InvalidInput { .. } => 2,
            _ => 1,
        }
    }
}

/// Redact credentials and sensitive paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = redact(&SECRET_ASSIGNMENT, message.to_string(), "${1}=***");
    let sanitized = redact(&BEARER_TOKEN, sanitized, "Bearer ***");
    let mut sanitized = redact(&SENSITIVE_PATH, sanitized, "/***REDACTED***/");

    if sanitized.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN - TRUNCATE_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(TRUNCATE_SUFFIX);
    }

    sanitized
}

pub type ClientResult<T> = Result<T, ClientError>;
