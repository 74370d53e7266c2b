//! Owned handle to the persistent event channel
//!
//! `connect()` spawns a reconnection supervisor that owns the live session.
//! Every lifecycle signal is emitted from that one task, so subscribers see
//! them in the order they happened. `disconnect()` signals the supervisor
//! through a `watch` channel, which also interrupts a pending retry delay.

use super::channel::{
    Channel, DisconnectReason, Listener, ListenerId, ListenerRegistry, TransportSignal,
};
use super::reconnect::{ReconnectPolicy, ReconnectionDecision};
use super::session::{Connector, Session, TransportError, TransportKind};
use crate::config::SocketSection;
use crate::error::sanitize_error_message;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Grace period for the supervisor to close its session after `disconnect()`
const SUPERVISOR_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Coarse view of what the supervisor is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No supervisor; `connect()` starts a fresh cycle
    Idle,
    /// Handshake in flight
    Connecting,
    /// Session established
    Open(TransportKind),
    /// Waiting out the delay before retry `attempt`
    WaitingToRetry { attempt: u32 },
}

impl LinkStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, LinkStatus::Idle)
    }
}

/// Tunables taken from the `[socket]` config section
#[derive(Debug, Clone)]
pub struct HandleSettings {
    pub transports: Vec<TransportKind>,
    pub policy: ReconnectPolicy,
    pub handshake_timeout: Duration,
}

impl Default for HandleSettings {
    fn default() -> Self {
        Self::from(&SocketSection::default())
    }
}

impl From<&SocketSection> for HandleSettings {
    fn from(section: &SocketSection) -> Self {
        Self {
            transports: section.transports.clone(),
            policy: section.reconnect_policy(),
            handshake_timeout: section.handshake_timeout(),
        }
    }
}

/// Handle to the persistent channel; clones share one connection
#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    shared: Arc<Shared>,
    supervisor: Mutex<Slot>,
}

/// Who owns the connection cycle right now
#[derive(Default)]
enum Slot {
    #[default]
    Empty,
    Running(Supervisor),
    /// `disconnect()` is tearing the cycle down; `connect()` is refused
    Stopping,
}

/// State the supervisor task needs; never holds the supervisor slot
struct Shared {
    settings: HandleSettings,
    connector: Arc<dyn Connector>,
    listeners: Mutex<ListenerRegistry>,
    link: watch::Sender<LinkStatus>,
}

struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TransportHandle {
    pub fn new(settings: HandleSettings, connector: Arc<dyn Connector>) -> Self {
        let (link, _) = watch::channel(LinkStatus::Idle);
        Self {
            inner: Arc::new(HandleInner {
                shared: Arc::new(Shared {
                    settings,
                    connector,
                    listeners: Mutex::new(ListenerRegistry::new()),
                    link,
                }),
                supervisor: Mutex::new(Slot::Empty),
            }),
        }
    }

    /// Start a connection cycle unless one is already live
    ///
    /// Returns `false` when the call was a no-op: connected, handshaking,
    /// waiting to retry, or a `disconnect()` still in progress (this includes
    /// calls made from a `disconnect` handler). Must be called from within a
    /// Tokio runtime. Failures are reported on the `connect_error` channel.
    pub fn connect(&self) -> bool {
        let mut slot = lock(&self.inner.supervisor);
        let previous = match std::mem::take(&mut *slot) {
            Slot::Stopping => {
                *slot = Slot::Stopping;
                debug!("connect() ignored: disconnect in progress");
                return false;
            }
            Slot::Running(supervisor) if !supervisor.task.is_finished() => {
                let status = *self.inner.shared.link.borrow();
                if !status.is_idle() {
                    debug!(status = ?status, "connect() ignored: connection cycle already live");
                    *slot = Slot::Running(supervisor);
                    return false;
                }
                // The old cycle gave up and is finishing its last signal.
                let _ = supervisor.shutdown_tx.send(true);
                Some(supervisor.task)
            }
            Slot::Running(_) | Slot::Empty => None,
        };

        self.inner.shared.link.send_replace(LinkStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.inner.shared);
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(error = %e, "Previous reconnection supervisor ended abnormally");
                }
            }
            shared.supervise(shutdown_rx).await
        });
        *slot = Slot::Running(Supervisor { shutdown_tx, task });
        true
    }

    /// Tear down the connection and cancel any scheduled retry
    ///
    /// Idempotent: a second call, or a call on an idle handle, does nothing.
    /// Afterwards `connect()` starts from a clean slate.
    pub async fn disconnect(&self) {
        let supervisor = {
            let mut slot = lock(&self.inner.supervisor);
            match std::mem::replace(&mut *slot, Slot::Stopping) {
                Slot::Running(supervisor) => supervisor,
                other => {
                    *slot = other;
                    debug!("disconnect() ignored: no connection cycle");
                    return;
                }
            }
        };
        // Releases the slot even if this future is dropped mid-teardown.
        let _release = StoppingGuard { inner: &*self.inner };
        let Supervisor {
            shutdown_tx,
            mut task,
        } = supervisor;

        let _ = shutdown_tx.send(true);
        info!("Sent shutdown signal to reconnection supervisor");

        match tokio::time::timeout(SUPERVISOR_SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => debug!("Reconnection supervisor stopped"),
            Ok(Err(e)) => warn!(error = %e, "Reconnection supervisor ended abnormally"),
            Err(_) => {
                warn!("Reconnection supervisor didn't stop in time, forcing abort");
                task.abort();
                self.inner.shared.link.send_replace(LinkStatus::Idle);
                // The aborted task never got to announce the teardown.
                self.inner.shared.emit(TransportSignal::Disconnected {
                    reason: DisconnectReason::ClientRequested,
                    will_reconnect: false,
                });
            }
        }
    }

    /// Register a handler for one channel; handlers run in registration order
    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> ListenerId
    where
        F: Fn(&TransportSignal) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(handler);
        lock(&self.inner.shared.listeners).add(channel, listener)
    }

    /// Remove a handler; `false` if it was not registered on `channel`
    pub fn unsubscribe(&self, channel: Channel, id: ListenerId) -> bool {
        lock(&self.inner.shared.listeners).remove(channel, id)
    }

    pub fn listener_count(&self, channel: Channel) -> usize {
        lock(&self.inner.shared.listeners).count(channel)
    }

    pub fn link_status(&self) -> LinkStatus {
        *self.inner.shared.link.borrow()
    }

    pub fn watch_link(&self) -> watch::Receiver<LinkStatus> {
        self.inner.shared.link.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link_status(), LinkStatus::Open(_))
    }

    pub fn settings(&self) -> &HandleSettings {
        &self.inner.shared.settings
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("link", &self.link_status())
            .field("settings", &self.inner.shared.settings)
            .finish()
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // No async in Drop: stop the supervisor without the graceful close.
        if let Slot::Running(supervisor) = std::mem::take(&mut *lock(&self.supervisor)) {
            let _ = supervisor.shutdown_tx.send(true);
            supervisor.task.abort();
        }
    }
}

/// Ends a `Slot::Stopping` phase
struct StoppingGuard<'a> {
    inner: &'a HandleInner,
}

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(&self.inner.supervisor);
        if matches!(*slot, Slot::Stopping) {
            *slot = Slot::Empty;
            self.inner.shared.link.send_replace(LinkStatus::Idle);
        }
    }
}

impl Shared {
    fn emit(&self, signal: TransportSignal) {
        let listeners = lock(&self.listeners).snapshot(signal.channel());
        for listener in listeners {
            listener(&signal);
        }
    }

    async fn supervise(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(transports = ?self.settings.transports, "Starting reconnection supervisor");
        self.emit(TransportSignal::Connecting);

        let mut failures: u32 = 0;
        loop {
            let opened = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    self.finish_client_requested();
                    return;
                }
                opened = self.open_preferred() => opened,
            };

            let decision = match opened {
                Ok(mut session) => {
                    failures = 0;
                    let kind = session.kind();
                    self.link.send_replace(LinkStatus::Open(kind));
                    info!(transport = %kind, "Connected to event channel");
                    self.emit(TransportSignal::Connected { transport: kind });

                    let reason = self.pump(session.as_mut(), &mut shutdown_rx).await;
                    session.close().await;
                    if reason.is_client_requested() {
                        info!("Event channel closed by client");
                        self.finish_client_requested();
                        return;
                    }

                    failures = 1;
                    let decision = self.settings.policy.decide(failures);
                    let will_reconnect = matches!(decision, ReconnectionDecision::Retry { .. });
                    warn!(reason = ?reason, will_reconnect, "Event channel dropped unexpectedly");
                    self.emit(TransportSignal::Disconnected {
                        reason,
                        will_reconnect,
                    });
                    decision
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let decision = self.settings.policy.decide(failures);
                    let will_retry = matches!(decision, ReconnectionDecision::Retry { .. });
                    let message = sanitize_error_message(&e.to_string());
                    warn!(
                        error = %message,
                        failures,
                        will_retry,
                        "Failed to connect to event channel"
                    );
                    self.emit(TransportSignal::ConnectError {
                        message,
                        will_retry,
                    });
                    decision
                }
            };

            match decision {
                ReconnectionDecision::Retry { attempt, delay } => {
                    self.link
                        .send_replace(LinkStatus::WaitingToRetry { attempt });
                    info!(
                        attempt,
                        max_attempts = self.settings.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnection"
                    );
                    if !interruptible_sleep(&mut shutdown_rx, delay).await {
                        info!("Shutdown signal received during reconnection delay, stopping");
                        self.finish_client_requested();
                        return;
                    }
                    self.link.send_replace(LinkStatus::Connecting);
                    self.emit(TransportSignal::ReconnectAttempt { attempt, delay });
                }
                ReconnectionDecision::GiveUp { attempts } => {
                    error!(attempts, "Max reconnection attempts exceeded, giving up");
                    self.link.send_replace(LinkStatus::Idle);
                    self.emit(TransportSignal::ReconnectFailed { attempts });
                    return;
                }
            }
        }
    }

    /// Try each configured transport in order; only the last failure is reported
    async fn open_preferred(&self) -> Result<Box<dyn Session>, TransportError> {
        let mut last_error = None;
        for (index, kind) in self.settings.transports.iter().copied().enumerate() {
            let attempt =
                tokio::time::timeout(self.settings.handshake_timeout, self.connector.open(kind))
                    .await;
            match attempt {
                Ok(Ok(session)) => {
                    if index > 0 {
                        info!(transport = %kind, "Connected using fallback transport");
                    }
                    return Ok(session);
                }
                Ok(Err(e)) => {
                    debug!(transport = %kind, error = %e, "Transport unavailable, trying next");
                    last_error = Some(e);
                }
                Err(_) => {
                    debug!(transport = %kind, "Handshake timed out, trying next");
                    last_error = Some(TransportError::HandshakeTimeout { kind });
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| TransportError::Protocol("no transports configured".to_string())))
    }

    /// Forward frames until the session ends or shutdown is requested
    async fn pump(
        &self,
        session: &mut dyn Session,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> DisconnectReason {
        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown_rx) => return DisconnectReason::ClientRequested,
                frame = session.next_frame() => match frame {
                    Some(Ok(text)) => self.emit(TransportSignal::Event(text)),
                    Some(Err(e)) => {
                        return DisconnectReason::TransportError(sanitize_error_message(
                            &e.to_string(),
                        ))
                    }
                    None => return DisconnectReason::TransportClosed,
                },
            }
        }
    }

    fn finish_client_requested(&self) {
        self.link.send_replace(LinkStatus::Idle);
        self.emit(TransportSignal::Disconnected {
            reason: DisconnectReason::ClientRequested,
            will_reconnect: false,
        });
    }
}

/// Resolve once shutdown is requested or the handle is gone
async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep with shutdown monitoring; `false` if shutdown interrupted it
async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown_rx) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
