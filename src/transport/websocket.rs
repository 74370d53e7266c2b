//! Network-backed sessions: WebSocket first, HTTP long-polling as fallback

use super::session::{Connector, Session, TransportError, TransportKind};
use crate::config::{ConfigError, SocketSection};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

/// Slack on top of the server hold time before a poll request is abandoned
const POLL_GRACE: Duration = Duration::from_secs(5);

/// Opens real sessions against the configured endpoints
#[derive(Debug, Clone)]
pub struct NetworkConnector {
    socket_url: Url,
    polling_url: Url,
    poll_timeout: Duration,
    http: reqwest::Client,
}

impl NetworkConnector {
    pub fn new(
        socket_url: Url,
        polling_url: Url,
        poll_timeout: Duration,
        http: reqwest::Client,
    ) -> Self {
        Self {
            socket_url,
            polling_url,
            poll_timeout,
            http,
        }
    }

    pub fn from_config(
        section: &SocketSection,
        http: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let socket_url = Url::parse(&section.url).map_err(|_| ConfigError::InvalidUrl {
            field: "socket.url",
            value: section.url.clone(),
        })?;
        Ok(Self::new(
            socket_url,
            section.resolve_polling_url()?,
            section.poll_timeout(),
            http,
        ))
    }

    async fn open_websocket(&self) -> Result<Box<dyn Session>, TransportError> {
        debug!(url = %self.socket_url, "Opening WebSocket");
        let (stream, response) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| TransportError::HandshakeFailed {
                kind: TransportKind::WebSocket,
                message: e.to_string(),
            })?;
        info!(status = %response.status(), "WebSocket connected");
        Ok(Box::new(WebSocketSession { stream }))
    }

    async fn open_polling(&self) -> Result<Box<dyn Session>, TransportError> {
        debug!(url = %self.polling_url, "Opening long-poll session");
        let mut session = PollingSession {
            http: self.http.clone(),
            url: self.polling_url.clone(),
            poll_timeout: self.poll_timeout,
            pending: VecDeque::new(),
            closed: false,
        };
        // Handshake is a non-blocking poll; anything it returns is kept.
        let frames = session
            .poll(Duration::ZERO)
            .await
            .map_err(|e| TransportError::HandshakeFailed {
                kind: TransportKind::Polling,
                message: e.to_string(),
            })?;
        session.pending.extend(frames);
        Ok(Box::new(session))
    }
}

#[async_trait]
impl Connector for NetworkConnector {
    async fn open(&self, kind: TransportKind) -> Result<Box<dyn Session>, TransportError> {
        match kind {
            TransportKind::WebSocket => self.open_websocket().await,
            TransportKind::Polling => self.open_polling().await,
        }
    }
}

pub struct WebSocketSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Session for WebSocketSession {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    info!(frame = ?frame, "WebSocket closed by server");
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    warn!(len = data.len(), "Ignoring binary frame");
                }
                // Pings are answered by tungstenite
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::ConnectionLost(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}

/// Long-poll session: each `GET` returns a JSON array of envelopes or `204`
pub struct PollingSession {
    http: reqwest::Client,
    url: Url,
    poll_timeout: Duration,
    pending: VecDeque<String>,
    closed: bool,
}

impl PollingSession {
    async fn poll(&self, wait: Duration) -> Result<Vec<String>, TransportError> {
        let response = self
            .http
            .get(self.url.clone())
            .query(&[("timeout_ms", wait.as_millis() as u64)])
            .timeout(wait + POLL_GRACE)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionLost(e.without_url().to_string()))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(Vec::new()),
            StatusCode::OK => {
                let envelopes: Vec<serde_json::Value> = response
                    .json()
                    .await
                    .map_err(|e| TransportError::Protocol(e.without_url().to_string()))?;
                Ok(envelopes.into_iter().map(|v| v.to_string()).collect())
            }
            status => Err(TransportError::ConnectionLost(format!(
                "poll returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl Session for PollingSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            if self.closed {
                return None;
            }
            match self.poll(self.poll_timeout).await {
                Ok(frames) => self.pending.extend(frames),
                Err(e) => {
                    self.closed = true;
                    return Some(Err(e));
                }
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}
