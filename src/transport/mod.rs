//! Persistent event channel
//!
//! [`TransportHandle`] owns the connection and its reconnection supervisor,
//! [`ConnectionStateMachine`] projects its lifecycle into a discrete state,
//! and [`NetworkConnector`] provides the real WebSocket and long-poll sessions.
//!
//! ```no_run
//! use betlink::config::SocketSection;
//! use betlink::transport::{
//!     ConnectionStateMachine, HandleSettings, NetworkConnector, TransportHandle,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let section = SocketSection::default();
//! let connector = NetworkConnector::from_config(&section, reqwest::Client::new()).unwrap();
//! let handle = TransportHandle::new(HandleSettings::from(&section), Arc::new(connector));
//!
//! // Attach before connecting so the first transition is not missed
//! let state = ConnectionStateMachine::new();
//! state.attach(&handle);
//! handle.connect();
//!
//! handle.disconnect().await;
//! # });
//! ```

pub mod channel;
pub mod handle;
pub mod reconnect;
pub mod session;
pub mod state;
pub mod websocket;

pub use channel::{Channel, DisconnectReason, ListenerId, ListenerRegistry, TransportSignal};
pub use handle::{HandleSettings, LinkStatus, TransportHandle};
pub use reconnect::{ReconnectPolicy, ReconnectionDecision};
pub use session::{Connector, Session, TransportError, TransportKind};
pub use state::{next_state, ConnectionState, ConnectionStateMachine, StateTransition};
pub use websocket::NetworkConnector;
