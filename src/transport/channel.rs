//! Named channels and the observer registry behind `subscribe`/`unsubscribe`

use super::session::TransportKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Channels a consumer can subscribe to on the transport handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// A connection cycle started
    Connecting,
    /// Handshake succeeded
    Connect,
    /// A live connection ended
    Disconnect,
    /// A handshake failed on every configured transport
    ConnectError,
    /// An automatic retry is starting
    ReconnectAttempt,
    /// The retry budget is exhausted
    ReconnectFailed,
    /// Inbound application frame
    Event,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Connecting,
        Channel::Connect,
        Channel::Disconnect,
        Channel::ConnectError,
        Channel::ReconnectAttempt,
        Channel::ReconnectFailed,
        Channel::Event,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Connecting => "connecting",
            Channel::Connect => "connect",
            Channel::Disconnect => "disconnect",
            Channel::ConnectError => "connect_error",
            Channel::ReconnectAttempt => "reconnect_attempt",
            Channel::ReconnectFailed => "reconnect_failed",
            Channel::Event => "event",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.name() == name)
    }
}

/// Why a live connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called; retry policy is bypassed
    ClientRequested,
    /// The peer closed the connection
    TransportClosed,
    /// The connection broke
    TransportError(String),
}

impl DisconnectReason {
    pub fn is_client_requested(&self) -> bool {
        matches!(self, DisconnectReason::ClientRequested)
    }
}

/// Payload delivered to channel subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Connecting,
    Connected {
        transport: TransportKind,
    },
    Disconnected {
        reason: DisconnectReason,
        will_reconnect: bool,
    },
    ConnectError {
        message: String,
        will_retry: bool,
    },
    ReconnectAttempt {
        attempt: u32,
        delay: Duration,
    },
    ReconnectFailed {
        attempts: u32,
    },
    /// Raw text frame; decoding happens at the router boundary
    Event(String),
}

impl TransportSignal {
    pub fn channel(&self) -> Channel {
        match self {
            TransportSignal::Connecting => Channel::Connecting,
            TransportSignal::Connected { .. } => Channel::Connect,
            TransportSignal::Disconnected { .. } => Channel::Disconnect,
            TransportSignal::ConnectError { .. } => Channel::ConnectError,
            TransportSignal::ReconnectAttempt { .. } => Channel::ReconnectAttempt,
            TransportSignal::ReconnectFailed { .. } => Channel::ReconnectFailed,
            TransportSignal::Event(_) => Channel::Event,
        }
    }
}

pub type Listener = Arc<dyn Fn(&TransportSignal) + Send + Sync>;

/// Token returned by `subscribe`, required to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Channel → ordered subscribers
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<Channel, Vec<(ListenerId, Listener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; delivery follows insertion order
    pub fn add(&mut self, channel: Channel, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(channel)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener; `false` if it was not registered on that channel
    pub fn remove(&mut self, channel: Channel, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(&channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        before != entries.len()
    }

    /// Listeners for a channel at this instant
    ///
    /// Dispatch iterates over the snapshot, so changes made while a signal is
    /// being delivered only affect later signals.
    pub fn snapshot(&self, channel: Channel) -> Vec<Listener> {
        self.listeners
            .get(&channel)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, channel: Channel) -> usize {
        self.listeners.get(&channel).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .listeners
            .iter()
            .map(|(channel, entries)| (channel.name(), entries.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}
