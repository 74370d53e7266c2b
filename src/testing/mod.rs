//! Testing utilities and mock implementations
//!
//! Lets the transport supervisor, router and health poller be exercised
//! without a backend or a network.

pub mod mocks;

pub use mocks::*;
