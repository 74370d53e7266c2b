//! Composition root
//!
//! [`ClientLifecycle`] builds every component from one [`ClientConfig`] and
//! wires them in the only safe order: the state machine and the router are
//! attached to the transport handle before anything can call `connect()`.

use crate::api::{ApiClient, AuthSession, FileTokenStore, MemoryTokenStore, TokenStore};
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::health::{HealthPoller, HealthPollerHandle, HttpProbe, ReachabilityProbe};
use crate::lifecycle_span;
use crate::protocol::{
    AuthResponse, BetTicket, CreateUserRequest, LoginRequest, ValidateBetRequest,
};
use crate::routing::EventRouter;
use crate::store::{bind_router, ActivityLogEntry, ApplicationStore};
use crate::transport::{
    ConnectionState, ConnectionStateMachine, Connector, HandleSettings, NetworkConnector,
    TransportHandle,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, Instrument};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ClientLifecycle {
    config: ClientConfig,
    api: ApiClient,
    auth: AuthSession,
    handle: TransportHandle,
    state: ConnectionStateMachine,
    router: EventRouter,
    store: ApplicationStore,
    health: HealthPoller,
    poller: Mutex<Option<HealthPollerHandle>>,
}

impl ClientLifecycle {
    /// Build the networked client: HTTP API, WebSocket/long-poll transport and
    /// `/health_check` probe share one connection pool
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let tokens: Arc<dyn TokenStore> = match &config.api.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        let api = ApiClient::from_config(&config.api, tokens)?;
        let connector = NetworkConnector::from_config(&config.socket, api.http_client())?;
        let probe = HttpProbe::new(
            api.http_client(),
            &config.api.base_url,
            config.health.timeout(),
        )?;
        Ok(Self::with_parts(config, api, Arc::new(connector), Arc::new(probe)))
    }

    /// Wire pre-built parts; nothing connects until [`start`](Self::start)
    pub fn with_parts(
        config: ClientConfig,
        api: ApiClient,
        connector: Arc<dyn Connector>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        let handle = TransportHandle::new(HandleSettings::from(&config.socket), connector);
        let store = ApplicationStore::new(config.store.activity_log_capacity);

        let state = ConnectionStateMachine::new();
        state.attach(&handle);

        let router = EventRouter::new();
        router.attach(&handle);
        bind_router(&router, &store);

        let health = HealthPoller::new(probe, store.clone(), &config.health);
        let auth = AuthSession::new(Arc::clone(api.tokens()));

        debug!("Client components wired");
        Self {
            config,
            api,
            auth,
            handle,
            state,
            router,
            store,
            health,
            poller: Mutex::new(None),
        }
    }

    /// Open the persistent channel and start health polling
    ///
    /// Safe to call repeatedly; returns whether a new connection cycle began.
    pub fn start(&self) -> bool {
        let _span = lifecycle_span!(phase = "start").entered();
        let started = self.handle.connect();
        let mut poller = lock(&self.poller);
        if !poller.as_ref().is_some_and(HealthPollerHandle::is_running) {
            *poller = Some(self.health.clone().spawn());
        }
        info!(connecting = started, "Client started");
        started
    }

    /// Reconnect the persistent channel only
    pub fn connect(&self) -> bool {
        self.handle.connect()
    }

    pub async fn disconnect(&self) {
        self.handle.disconnect().await;
    }

    /// Send a bet and record it with its round-trip latency
    ///
    /// The store is only touched when the backend accepts the request.
    pub async fn place_bet(&self, request: &ValidateBetRequest) -> ClientResult<BetTicket> {
        let started = Instant::now();
        let ticket = self.api.place_bet(request).await?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.store.set_last_bet(ticket.clone());
        self.store
            .add_log_entry(ActivityLogEntry::now(ticket.amount, latency_ms));
        debug!(amount = ticket.amount, latency_ms, "Bet recorded");
        Ok(ticket)
    }

    pub async fn register(&self, request: &CreateUserRequest) -> ClientResult<AuthResponse> {
        let response = self.api.register_user(request).await?;
        self.auth.login(&response)?;
        Ok(response)
    }

    pub async fn login(&self, request: &LoginRequest) -> ClientResult<AuthResponse> {
        let response = self.api.login_user(request).await?;
        self.auth.login(&response)?;
        Ok(response)
    }

    /// Drop the channel (cancelling any scheduled retry) and sign out
    pub async fn logout(&self) -> ClientResult<()> {
        self.handle.disconnect().await;
        self.auth.logout()?;
        Ok(())
    }

    /// Stop everything this client started
    pub async fn shutdown(&self) {
        async {
            self.handle.disconnect().await;
            let poller = lock(&self.poller).take();
            if let Some(poller) = poller {
                poller.stop().await;
            }
            info!("Client stopped");
        }
        .instrument(lifecycle_span!(phase = "shutdown"))
        .await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.state()
    }

    pub fn state_machine(&self) -> &ConnectionStateMachine {
        &self.state
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.handle
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn store(&self) -> &ApplicationStore {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn health(&self) -> &HealthPoller {
        &self.health
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_polling_health(&self) -> bool {
        lock(&self.poller)
            .as_ref()
            .is_some_and(HealthPollerHandle::is_running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProbeOutcome;
    use crate::testing::mocks::{mock_session, MockConnector, MockOpen, ScriptedProbe};
    use crate::transport::TransportKind;
    use std::time::Duration;
    use url::Url;

    fn lifecycle(connector: MockConnector) -> ClientLifecycle {
        let config = ClientConfig::default();
        let api = ApiClient::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            Duration::from_secs(1),
            Arc::new(MemoryTokenStore::with_token("t")),
        )
        .unwrap();
        ClientLifecycle::with_parts(
            config,
            api,
            Arc::new(connector),
            Arc::new(ScriptedProbe::new(vec![ProbeOutcome::Reachable])),
        )
    }

    #[test]
    fn test_components_attached_before_connect() {
        let client = lifecycle(MockConnector::default());
        assert!(client.state_machine().is_attached());
        assert!(client.router().is_attached());
        assert_eq!(client.router().subscriber_keys(), vec!["store".to_string()]);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_start_connects_and_polls_health() {
        let (session, _control) = mock_session(TransportKind::WebSocket);
        let client = lifecycle(MockConnector::new(vec![MockOpen::Accept(session)]));
        let mut state = client.state_machine().subscribe();
        let mut store = client.store().subscribe();

        assert!(client.start());
        state.wait_for(|s| s.is_connected()).await.unwrap();
        store.wait_for(|s| s.online).await.unwrap();
        assert!(client.is_polling_health());

        // Second start is a no-op for the channel
        assert!(!client.start());

        client.shutdown().await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(!client.is_polling_health());
    }

    #[tokio::test]
    async fn test_logout_disconnects_and_clears_token() {
        let (session, _control) = mock_session(TransportKind::WebSocket);
        let client = lifecycle(MockConnector::new(vec![MockOpen::Accept(session)]));
        let mut state = client.state_machine().subscribe();

        client.connect();
        state.wait_for(|s| s.is_connected()).await.unwrap();

        client.logout().await.unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert_eq!(client.api().tokens().load().unwrap(), None);
        assert!(!client.auth().is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_bet_leaves_store_untouched() {
        let client = lifecycle(MockConnector::default());
        let request = ValidateBetRequest {
            user_id: uuid::Uuid::new_v4(),
            match_id: uuid::Uuid::new_v4(),
            amount: 5.0,
            odds: 1.5,
        };

        assert!(client.place_bet(&request).await.is_err());
        let state = client.store().snapshot();
        assert!(state.last_bet.is_none());
        assert!(state.activity_log.is_empty());
    }
}
