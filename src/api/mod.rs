//! HTTP surface of the betting backend
//!
//! [`ApiClient`] wraps the request/response endpoints, [`TokenStore`] is where
//! the bearer token lives between runs, and [`AuthSession`] tracks who is
//! signed in.

pub mod auth;
pub mod client;
pub mod token;

pub use auth::{AuthSession, AuthState};
pub use client::{ApiClient, ApiError};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
