//! betlink - real-time betting client
//!
//! Keeps one persistent event channel to the betting backend alive, projects
//! its lifecycle into a [`ConnectionState`], routes typed inbound events into
//! an observable [`ApplicationStore`], and polls backend reachability on its
//! own timer.
//!
//! # Overview
//!
//! - [`transport`]: WebSocket-first channel with long-poll fallback, bounded
//!   exponential reconnection and the connection state machine
//! - [`routing`]: decode-or-reject event fan-out keyed by subscriber
//! - [`store`]: activity log, last ticket, online flag and live board
//! - [`health`]: fixed-interval reachability probe
//! - [`api`]: HTTP requests with optional bearer token
//! - [`lifecycle`]: wires the above in a safe order
//!
//! # Quick Start
//!
//! ```no_run
//! use betlink::{ClientConfig, ClientLifecycle};
//!
//! # async fn run() -> betlink::ClientResult<()> {
//! let client = ClientLifecycle::from_config(ClientConfig::from_env()?)?;
//! let mut state = client.state_machine().subscribe();
//!
//! client.start();
//! state.wait_for(|s| s.is_connected()).await.ok();
//! println!("online: {}", client.store().online());
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod status;
pub mod store;
pub mod testing;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use lifecycle::ClientLifecycle;
pub use protocol::{BetTicket, DomainEvent, EventKind};
pub use routing::EventRouter;
pub use status::StatusBadge;
pub use store::{ActivityLogEntry, ApplicationStore};
pub use transport::{ConnectionState, ConnectionStateMachine, TransportHandle};
