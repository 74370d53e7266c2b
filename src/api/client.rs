//! Request/response client for the backend
//!
//! Every request carries `Authorization: Bearer <token>` when the token store
//! holds one; without a token requests go out unauthenticated.

use super::token::TokenStore;
use crate::config::{endpoints, ApiSection, ConfigError};
use crate::protocol::{
    AuthResponse, CreateUserRequest, LoginRequest, ValidateBetRequest, ValidateBetResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Request(e) if e.is_timeout())
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn from_config(
        section: &ApiSection,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&section.base_url).map_err(|_| ConfigError::InvalidUrl {
            field: "api.base_url",
            value: section.base_url.clone(),
        })?;
        Self::new(base_url, section.timeout(), tokens)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }

    /// Shared connection pool, reused by the health probe and the polling transport
    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// `GET /health_check`; any error or non-2xx is `false`
    pub async fn check_health(&self) -> bool {
        let url = match self.base_url.join(endpoints::HEALTH_CHECK) {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.authorize(self.http.get(url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    pub async fn place_bet(
        &self,
        request: &ValidateBetRequest,
    ) -> Result<ValidateBetResponse, ApiError> {
        request.validate().map_err(ApiError::InvalidRequest)?;
        self.post_json(endpoints::BETS, request).await
    }

    pub async fn register_user(
        &self,
        request: &CreateUserRequest,
    ) -> Result<AuthResponse, ApiError> {
        self.post_json(endpoints::REGISTER, request).await
    }

    pub async fn login_user(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.post_json(endpoints::LOGIN, request).await
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.load() {
            Ok(Some(token)) => builder.bearer_auth(token),
            Ok(None) => builder,
            Err(e) => {
                warn!(error = %e, "Could not read auth token, sending unauthenticated");
                builder
            }
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        debug!(url = %url, "POST");

        let response = self.authorize(self.http.post(url)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
