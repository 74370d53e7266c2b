//! I/O seam between the transport handle and the network
//!
//! A [`Connector`] opens one [`Session`] per handshake. The handle never talks
//! to sockets directly, which keeps the reconnection supervisor testable with
//! scripted connectors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Underlying channel flavour, in the order they are usually preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Low-latency bidirectional socket
    WebSocket,
    /// HTTP long-polling fallback
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failures
///
/// These never reach application code as errors; the handle turns them into
/// `connect_error` and `disconnect` signals.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Handshake failed over {kind}: {message}")]
    HandshakeFailed { kind: TransportKind, message: String },
    #[error("Handshake over {kind} timed out")]
    HandshakeTimeout { kind: TransportKind },
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Protocol violation: {0}")]
    Protocol(String),
    #[error("Transport {0} is not available")]
    Unsupported(TransportKind),
}

/// Opens sessions over a given transport
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake; resolves once the session is usable
    async fn open(&self, kind: TransportKind) -> Result<Box<dyn Session>, TransportError>;
}

/// One established connection
#[async_trait]
pub trait Session: Send {
    fn kind(&self) -> TransportKind;

    /// Next inbound text frame
    ///
    /// `None` means the peer closed the connection cleanly; `Some(Err(..))`
    /// means the connection broke.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection; must be safe to call on a broken session
    async fn close(&mut self);
}
