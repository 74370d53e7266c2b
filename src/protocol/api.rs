//! Request and response bodies for the backend HTTP surface

use super::events::BetTicket;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /bets`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateBetRequest {
    pub user_id: Uuid,
    pub match_id: Uuid,
    pub amount: f64,
    pub odds: f64,
}

impl ValidateBetRequest {
    /// Reject requests the backend can never accept
    pub fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        if !self.odds.is_finite() {
            return Err(format!("odds must be finite, got {}", self.odds));
        }
        Ok(())
    }
}

/// `POST /bets` echoes the ticket
pub type ValidateBetResponse = BetTicket;

/// Body of `POST /register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Body of `POST /login`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Created,
    Authenticated,
}

/// Response of `POST /register` and `POST /login`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub status: AuthStatus,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Bearer token, when the backend issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Response of `GET /health_check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
}
