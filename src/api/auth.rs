//! Signed-in user state

use super::token::{TokenStore, TokenStoreError};
use crate::protocol::AuthResponse;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub is_authenticated: bool,
}

/// Observable auth state backed by a [`TokenStore`]
#[derive(Clone)]
pub struct AuthSession {
    state: Arc<watch::Sender<AuthState>>,
    tokens: Arc<dyn TokenStore>,
}

impl AuthSession {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            state: Arc::new(state),
            tokens,
        }
    }

    /// Record a successful register or login; stores the token when one was issued
    pub fn login(&self, response: &AuthResponse) -> Result<(), TokenStoreError> {
        if let Some(token) = response.token.as_deref() {
            self.tokens.save(token)?;
        }
        self.state.send_modify(|s| {
            s.user_id = Some(response.user_id.clone());
            if let Some(name) = &response.name {
                s.name = Some(name.clone());
            }
            s.is_authenticated = true;
        });
        info!(user_id = %response.user_id, "Signed in");
        Ok(())
    }

    /// Drop the token and reset to signed-out; the state is reset even if
    /// removing the token fails
    pub fn logout(&self) -> Result<(), TokenStoreError> {
        let cleared = self.tokens.clear();
        self.state.send_replace(AuthState::default());
        info!("Signed out");
        cleared
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryTokenStore;
    use crate::protocol::AuthStatus;

    fn response(token: Option<&str>, name: Option<&str>) -> AuthResponse {
        AuthResponse {
            status: AuthStatus::Authenticated,
            user_id: "u-42".to_string(),
            name: name.map(str::to_string),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_login_then_logout() {
        let tokens = Arc::new(MemoryTokenStore::new());
        let session = AuthSession::new(tokens.clone());

        session.login(&response(Some("tok"), Some("Ada"))).unwrap();
        assert_eq!(
            session.state(),
            AuthState {
                user_id: Some("u-42".to_string()),
                name: Some("Ada".to_string()),
                is_authenticated: true,
            }
        );
        assert_eq!(tokens.load().unwrap().as_deref(), Some("tok"));

        session.logout().unwrap();
        assert_eq!(session.state(), AuthState::default());
        assert_eq!(tokens.load().unwrap(), None);
    }

    #[test]
    fn test_login_without_name_keeps_previous_name() {
        let session = AuthSession::new(Arc::new(MemoryTokenStore::new()));
        session.login(&response(None, Some("Ada"))).unwrap();
        session.login(&response(None, None)).unwrap();
        assert_eq!(session.state().name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_subscribers_see_login() {
        let session = AuthSession::new(Arc::new(MemoryTokenStore::new()));
        let mut rx = session.subscribe();

        session.login(&response(None, None)).unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_authenticated);
    }
}
