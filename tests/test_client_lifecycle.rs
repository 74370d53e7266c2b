//! End-to-end client tests: HTTP against wiremock, persistent channel scripted

use betlink::api::{ApiClient, AuthState, FileTokenStore, MemoryTokenStore, TokenStore};
use betlink::config::ClientConfig;
use betlink::health::ProbeOutcome;
use betlink::protocol::{DomainEvent, LoginRequest, ValidateBetRequest};
use betlink::testing::{mock_session, MockConnector, MockOpen, ScriptedProbe};
use betlink::transport::{ConnectionState, TransportKind};
use betlink::{ClientError, ClientLifecycle, StatusBadge};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(
    server: &MockServer,
    tokens: Arc<dyn TokenStore>,
    connector: MockConnector,
) -> ClientLifecycle {
    let base_url = Url::parse(&server.uri()).unwrap();
    let api = ApiClient::new(base_url, Duration::from_secs(2), tokens).unwrap();
    ClientLifecycle::with_parts(
        ClientConfig::default(),
        api,
        Arc::new(connector),
        Arc::new(ScriptedProbe::new(vec![ProbeOutcome::Reachable])),
    )
}

fn bet(amount: f64) -> ValidateBetRequest {
    ValidateBetRequest {
        user_id: Uuid::new_v4(),
        match_id: Uuid::new_v4(),
        amount,
        odds: 1.9,
    }
}

#[tokio::test]
async fn test_place_bet_records_ticket_and_latency() {
    // Arrange
    let server = MockServer::start().await;
    let request = bet(10.50);
    let mut echoed = serde_json::to_value(&request).unwrap();
    echoed["status"] = serde_json::json!("VALIDATED");
    Mock::given(method("POST"))
        .and(path("/bets"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(echoed)
                .set_delay(Duration::from_millis(20)),
        )
        .mount(&server)
        .await;
    let client = client(&server, Arc::new(MemoryTokenStore::new()), MockConnector::default());

    // Act
    let ticket = client.place_bet(&request).await.unwrap();

    // Assert
    let state = client.store().snapshot();
    assert_eq!(state.last_bet, Some(ticket));
    let entry = state.activity_log.newest().unwrap();
    assert_eq!(entry.amount, 10.50);
    assert!(entry.latency_ms >= 20.0, "latency {}", entry.latency_ms);
    assert_eq!(entry.latency_ms, (entry.latency_ms * 100.0).round() / 100.0);
    assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
}

#[tokio::test]
async fn test_rejected_bet_leaves_store_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bets"))
        .respond_with(ResponseTemplate::new(422).set_body_string("odds moved"))
        .mount(&server)
        .await;
    let client = client(&server, Arc::new(MemoryTokenStore::new()), MockConnector::default());

    let err = client.place_bet(&bet(5.0)).await.unwrap_err();

    assert!(matches!(err, ClientError::Api(_)));
    assert_eq!(err.exit_code(), 1);
    let state = client.store().snapshot();
    assert!(state.last_bet.is_none());
    assert!(state.activity_log.is_empty());
}

#[tokio::test]
async fn test_activity_log_keeps_eight_most_recent_bets() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bets"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .mount(&server)
        .await;
    let client = client(&server, Arc::new(MemoryTokenStore::new()), MockConnector::default());

    for amount in 1..=10 {
        client.place_bet(&bet(amount as f64)).await.unwrap();
    }

    let amounts: Vec<f64> = client.store().activity_log().iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0]);
}

#[tokio::test]
async fn test_login_persists_token_for_later_requests() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "authenticated",
            "user_id": "u-7",
            "name": "Grace",
            "token": "tok-7"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bets"))
        .and(header("authorization", "Bearer tok-7"))
        .respond_with(|req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token")));
    let client = client(&server, tokens.clone(), MockConnector::default());

    // Act
    client
        .login(&LoginRequest {
            email: "grace@example.com".to_string(),
            password: "hunter2".to_string(),
        })
        .await
        .unwrap();
    client.place_bet(&bet(3.0)).await.unwrap();

    // Assert
    assert_eq!(tokens.load().unwrap().as_deref(), Some("tok-7"));
    assert_eq!(
        client.auth().state(),
        AuthState {
            user_id: Some("u-7".to_string()),
            name: Some("Grace".to_string()),
            is_authenticated: true,
        }
    );

    client.logout().await.unwrap();
    assert_eq!(tokens.load().unwrap(), None);
    assert_eq!(client.auth().state(), AuthState::default());
}

#[tokio::test(start_paused = true)]
async fn test_logout_cancels_pending_reconnect() {
    let server = MockServer::start().await;
    let connector = MockConnector::default();
    let client = client(&server, Arc::new(MemoryTokenStore::with_token("t")), connector.clone());
    let mut state = client.state_machine().subscribe();

    client.start();
    state
        .wait_for(|s| *s == ConnectionState::Reconnecting)
        .await
        .unwrap();
    client.logout().await.unwrap();

    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        StatusBadge::from(client.connection_state()).label,
        "Disconnected"
    );
    tokio::time::sleep(Duration::from_secs(30)).await;
    // One cycle tries both default transports, then nothing more
    assert_eq!(connector.open_count(), 2);

    client.shutdown().await;
}

#[tokio::test]
async fn test_started_client_applies_channel_events() {
    let server = MockServer::start().await;
    let (session, control) = mock_session(TransportKind::WebSocket);
    let client = client(
        &server,
        Arc::new(MemoryTokenStore::new()),
        MockConnector::new(vec![MockOpen::Accept(session)]),
    );
    let mut store = client.store().subscribe();

    client.start();
    control.send_event(&DomainEvent::OddsUpdate {
        match_id: "derby".to_string(),
        odds: 2.75,
    });
    store
        .wait_for(|s| s.online && s.board.odds.contains_key("derby"))
        .await
        .unwrap();

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    client.shutdown().await;
}
