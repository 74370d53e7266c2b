//! Wire types for the betting backend
//!
//! `events` holds the typed events carried on the persistent channel,
//! `api` the request and response bodies of the HTTP surface.

pub mod api;
pub mod events;

pub use api::*;
pub use events::*;
