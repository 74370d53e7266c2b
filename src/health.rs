//! Backend reachability polling
//!
//! Independent of the persistent channel: a timer probes the backend's status
//! endpoint and writes a plain boolean into the store. Every failure path ends
//! in `false`; the failure kind only shows up in logs.

use crate::config::{endpoints, ConfigError, HealthSection, MAX_HEALTH_RETRIES};
use crate::health_span;
use crate::store::ApplicationStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};
use url::Url;

/// Why a probe counted as unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    Network,
    Status(u16),
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::Timeout => f.write_str("timeout"),
            ProbeFailure::Network => f.write_str("network"),
            ProbeFailure::Status(code) => write!(f, "status {code}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

/// A lightweight request that only answers "does the backend respond?"
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Never fails; errors are folded into [`ProbeOutcome::Unreachable`]
    async fn probe(&self) -> ProbeOutcome;
}

/// `GET /health_check`; any 2xx is reachable
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let url = Url::parse(base_url)
            .and_then(|base| base.join(endpoints::HEALTH_CHECK))
            .map_err(|_| ConfigError::InvalidUrl {
                field: "api.base_url",
                value: base_url.to_string(),
            })?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> ProbeOutcome {
        let result = self
            .client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => ProbeOutcome::Reachable,
            Ok(response) => {
                ProbeOutcome::Unreachable(ProbeFailure::Status(response.status().as_u16()))
            }
            Err(e) if e.is_timeout() => ProbeOutcome::Unreachable(ProbeFailure::Timeout),
            Err(_) => ProbeOutcome::Unreachable(ProbeFailure::Network),
        }
    }
}

/// Periodic prober that owns the store's online flag
#[derive(Clone)]
pub struct HealthPoller {
    probe: Arc<dyn ReachabilityProbe>,
    store: ApplicationStore,
    interval: Duration,
    retries: u32,
}

impl HealthPoller {
    /// `settings.retries` is capped at `MAX_HEALTH_RETRIES`
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        store: ApplicationStore,
        settings: &HealthSection,
    ) -> Self {
        Self {
            probe,
            store,
            interval: settings.interval(),
            retries: settings.retries.min(MAX_HEALTH_RETRIES),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe with up to `retries` immediate retries; does not touch the store
    pub async fn check(&self) -> ProbeOutcome {
        let mut outcome = self.probe.probe().await;
        let mut retry = 0;
        while let ProbeOutcome::Unreachable(failure) = outcome {
            debug!(failure = %failure, retry, "Health probe failed");
            if retry >= self.retries {
                break;
            }
            retry += 1;
            outcome = self.probe.probe().await;
        }
        outcome
    }

    /// One scheduled probe: check, then write the online flag
    pub async fn poll_once(&self) -> bool {
        let outcome = self
            .check()
            .instrument(health_span!(retries = self.retries))
            .await;
        let online = outcome.is_reachable();
        let previous = self.store.set_online(online);
        match (previous, online) {
            (false, true) => info!("Backend reachable"),
            (true, false) => warn!("Backend unreachable"),
            _ => {}
        }
        online
    }

    /// Run on the fixed interval until stopped; the first probe is immediate
    pub fn spawn(self) -> HealthPollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(interval_ms = self.interval.as_millis() as u64, "Starting health poller");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        // A probe in flight is abandoned on shutdown and never written.
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => break,
                            _ = self.poll_once() => {}
                        }
                    }
                }
            }
            debug!("Health poller stopped");
        });
        HealthPollerHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

impl std::fmt::Debug for HealthPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthPoller")
            .field("interval", &self.interval)
            .field("retries", &self.retries)
            .finish()
    }
}

/// Stops the poller task; dropping it aborts the task
#[derive(Debug)]
pub struct HealthPollerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl HealthPollerHandle {
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Health poller ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for HealthPollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::ScriptedProbe;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poller(probe: ScriptedProbe, retries: u32) -> (HealthPoller, ApplicationStore) {
        let store = ApplicationStore::default();
        let settings = HealthSection {
            retries,
            ..HealthSection::default()
        };
        (
            HealthPoller::new(Arc::new(probe), store.clone(), &settings),
            store,
        )
    }

    #[tokio::test]
    async fn test_http_probe_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health_check"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .mount(&server)
            .await;

        let probe =
            HttpProbe::new(reqwest::Client::new(), &server.uri(), Duration::from_secs(1)).unwrap();

        assert_eq!(probe.probe().await, ProbeOutcome::Reachable);
    }

    #[tokio::test]
    async fn test_http_probe_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health_check"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe =
            HttpProbe::new(reqwest::Client::new(), &server.uri(), Duration::from_secs(1)).unwrap();

        assert_eq!(
            probe.probe().await,
            ProbeOutcome::Unreachable(ProbeFailure::Status(503))
        );
    }

    #[tokio::test]
    async fn test_http_probe_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health_check"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let probe = HttpProbe::new(
            reqwest::Client::new(),
            &server.uri(),
            Duration::from_millis(50),
        )
        .unwrap();

        assert_eq!(
            probe.probe().await,
            ProbeOutcome::Unreachable(ProbeFailure::Timeout)
        );
    }

    #[tokio::test]
    async fn test_http_probe_network_error() {
        let probe = HttpProbe::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            probe.probe().await,
            ProbeOutcome::Unreachable(ProbeFailure::Network)
        );
    }

    #[test]
    fn test_http_probe_rejects_bad_base_url() {
        let result = HttpProbe::new(reqwest::Client::new(), "not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_single_immediate_retry() {
        let probe = ScriptedProbe::new(vec![
            ProbeOutcome::Unreachable(ProbeFailure::Timeout),
            ProbeOutcome::Reachable,
        ]);
        let (poller, store) = poller(probe.clone(), 1);

        assert!(poller.poll_once().await);
        assert!(store.online());
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_is_respected() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Unreachable(ProbeFailure::Network)]);
        let (poller, store) = poller(probe.clone(), 1);
        store.set_online(true);

        assert!(!poller.poll_once().await);
        assert!(!store.online());
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn test_oversized_retry_setting_is_capped() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Unreachable(ProbeFailure::Timeout)]);
        let (poller, store) = poller(probe.clone(), 50);

        assert_eq!(poller.check().await, ProbeOutcome::Unreachable(ProbeFailure::Timeout));
        assert!(!store.online());
        assert_eq!(probe.calls(), 1 + MAX_HEALTH_RETRIES as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_poller_probes_on_interval_until_stopped() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Reachable]);
        let (poller, store) = poller(probe.clone(), 0);
        let mut online = store.subscribe();

        let handle = poller.spawn();
        online.wait_for(|s| s.online).await.unwrap();
        assert_eq!(probe.calls(), 1);

        tokio::time::sleep(Duration::from_millis(30_000 * 2 + 10)).await;
        assert_eq!(probe.calls(), 3);

        assert!(handle.is_running());
        handle.stop().await;
        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert_eq!(probe.calls(), 3);
    }
}
