//! Inbound event routing
//!
//! [`EventRouter`] sits between the transport's generic `event` channel and
//! application state: it rejects frames that don't decode into the closed
//! [`crate::protocol::DomainEvent`] set and fans the rest out by subscriber key.

pub mod router;

pub use router::{DispatchOutcome, EventFilter, EventHandler, EventRouter};
