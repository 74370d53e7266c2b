//! Connection state derived from transport lifecycle signals
//!
//! The machine owns no timers. It is a projection of what the transport
//! handle reports, so it has to be attached before the first `connect()`.

use super::channel::{Channel, ListenerId, TransportSignal};
use super::handle::TransportHandle;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

const TRANSITION_BUFFER: usize = 64;

/// Discrete connection state, exactly one live at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Next state after a lifecycle signal (pure function)
pub fn next_state(current: ConnectionState, signal: &TransportSignal) -> ConnectionState {
    match signal {
        TransportSignal::Connecting => ConnectionState::Connecting,
        TransportSignal::Connected { .. } => ConnectionState::Connected,
        TransportSignal::ConnectError { will_retry, .. } => {
            if *will_retry {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            }
        }
        TransportSignal::Disconnected { will_reconnect, .. } => {
            if *will_reconnect {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            }
        }
        TransportSignal::ReconnectFailed { .. } => ConnectionState::Disconnected,
        TransportSignal::ReconnectAttempt { .. } | TransportSignal::Event(_) => current,
    }
}

fn log_transition(transition: &StateTransition) {
    use ConnectionState::*;
    match (transition.from, transition.to) {
        (Connected, Reconnecting) => warn!("Connection lost, reconnecting"),
        (Reconnecting, Disconnected) => error!("Reconnection budget exhausted"),
        (Reconnecting, Connected) => info!("Reconnection successful"),
        (from, to) => info!(from = %from, to = %to, "Connection state changed"),
    }
}

/// Lifecycle channels the machine listens on
const LIFECYCLE_CHANNELS: [Channel; 5] = [
    Channel::Connecting,
    Channel::Connect,
    Channel::Disconnect,
    Channel::ConnectError,
    Channel::ReconnectFailed,
];

/// Reactive holder of the current [`ConnectionState`]
#[derive(Clone)]
pub struct ConnectionStateMachine {
    inner: Arc<MachineInner>,
}

struct MachineInner {
    state_tx: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<StateTransition>,
    attachment: Mutex<Vec<(Channel, ListenerId)>>,
}

impl MachineInner {
    fn apply(&self, signal: &TransportSignal) -> Option<StateTransition> {
        let mut transition = None;
        self.state_tx.send_if_modified(|state| {
            let next = next_state(*state, signal);
            if next == *state {
                return false;
            }
            transition = Some(StateTransition {
                from: *state,
                to: next,
            });
            *state = next;
            true
        });

        if let Some(t) = transition {
            log_transition(&t);
            // No receivers is fine
            let _ = self.transitions.send(t);
        }
        transition
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            inner: Arc::new(MachineInner {
                state_tx,
                transitions,
                attachment: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to the handle's lifecycle channels; a second call is a no-op
    pub fn attach(&self, handle: &TransportHandle) {
        let mut attachment = self
            .inner
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !attachment.is_empty() {
            return;
        }
        for channel in LIFECYCLE_CHANNELS {
            let inner = Arc::clone(&self.inner);
            let id = handle.subscribe(channel, move |signal| {
                inner.apply(signal);
            });
            attachment.push((channel, id));
        }
    }

    /// Remove the lifecycle listeners; the current state is kept
    pub fn detach(&self, handle: &TransportHandle) {
        let mut attachment = self
            .inner
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (channel, id) in attachment.drain(..) {
            handle.unsubscribe(channel, id);
        }
    }

    pub fn is_attached(&self) -> bool {
        !self
            .inner
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Feed one signal by hand; returns the transition it caused, if any
    pub fn apply(&self, signal: &TransportSignal) -> Option<StateTransition> {
        self.inner.apply(signal)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Latest-value view; intermediate states may be coalesced
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Every transition in order, for consumers that must not miss a step
    pub fn transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.inner.transitions.subscribe()
    }
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("state", &self.state())
            .field("attached", &self.is_attached())
            .finish()
    }
}
