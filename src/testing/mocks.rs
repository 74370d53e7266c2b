//! Mock implementations for testing
//!
//! Scripted stand-ins for the network seams: a [`Connector`] whose handshakes
//! succeed or fail on cue, sessions driven from the test through
//! [`MockSessionControl`], and a [`ReachabilityProbe`] with canned outcomes.

use crate::health::{ProbeOutcome, ReachabilityProbe};
use crate::protocol::DomainEvent;
use crate::transport::{
    Channel, Connector, Session, TransportError, TransportHandle, TransportKind, TransportSignal,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted result of one `open` call
pub enum MockOpen {
    Accept(MockSession),
    Refuse(String),
    /// Never completes; exercises the handshake timeout
    Hang,
}

#[derive(Default)]
struct ConnectorState {
    script: VecDeque<MockOpen>,
    opened: Vec<TransportKind>,
}

/// Connector that plays back a script; refuses once the script runs out
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new(script: Vec<MockOpen>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectorState {
                script: script.into(),
                opened: Vec::new(),
            })),
        }
    }

    /// Append an outcome to the script
    pub fn push(&self, outcome: MockOpen) {
        lock(&self.state).script.push_back(outcome);
    }

    /// Transport kinds passed to `open`, in call order
    pub fn opened(&self) -> Vec<TransportKind> {
        lock(&self.state).opened.clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).opened.len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, kind: TransportKind) -> Result<Box<dyn Session>, TransportError> {
        let next = {
            let mut state = lock(&self.state);
            state.opened.push(kind);
            state.script.pop_front()
        };
        match next {
            Some(MockOpen::Accept(session)) => Ok(Box::new(session)),
            Some(MockOpen::Refuse(message)) => {
                Err(TransportError::HandshakeFailed { kind, message })
            }
            Some(MockOpen::Hang) => std::future::pending().await,
            None => Err(TransportError::HandshakeFailed {
                kind,
                message: "connection refused".to_string(),
            }),
        }
    }
}

enum MockFrame {
    Text(String),
    Close,
    Fail(String),
}

/// Session fed by a [`MockSessionControl`]
pub struct MockSession {
    kind: TransportKind,
    frames: mpsc::UnboundedReceiver<MockFrame>,
    closed: Arc<AtomicBool>,
}

/// Test-side driver of a [`MockSession`]; dropping it ends the session
#[derive(Clone)]
pub struct MockSessionControl {
    frames: mpsc::UnboundedSender<MockFrame>,
    closed: Arc<AtomicBool>,
}

/// A connected session and its driver
pub fn mock_session(kind: TransportKind) -> (MockSession, MockSessionControl) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockSession {
            kind,
            frames: rx,
            closed: Arc::clone(&closed),
        },
        MockSessionControl { frames: tx, closed },
    )
}

impl MockSessionControl {
    pub fn send_frame(&self, text: impl Into<String>) {
        let _ = self.frames.send(MockFrame::Text(text.into()));
    }

    pub fn send_event(&self, event: &DomainEvent) {
        self.send_frame(event.to_wire().to_string());
    }

    /// Peer closes the connection cleanly
    pub fn drop_connection(&self) {
        let _ = self.frames.send(MockFrame::Close);
    }

    /// Connection breaks with an error
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.frames.send(MockFrame::Fail(message.into()));
    }

    /// Whether the client closed its side
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MockSession {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.frames.recv().await? {
            MockFrame::Text(text) => Some(Ok(text)),
            MockFrame::Close => None,
            MockFrame::Fail(message) => Some(Err(TransportError::ConnectionLost(message))),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.frames.close();
    }
}

/// Probe that plays back outcomes, repeating the last one
#[derive(Clone)]
pub struct ScriptedProbe {
    script: Arc<Mutex<VecDeque<ProbeOutcome>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn new(outcomes: Vec<ProbeOutcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the script with a single repeating outcome
    pub fn respond_with(&self, outcome: ProbeOutcome) {
        let mut script = lock(&self.script);
        script.clear();
        script.push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = lock(&self.script);
        if script.len() > 1 {
            script.pop_front().unwrap_or(ProbeOutcome::Reachable)
        } else {
            script.front().copied().unwrap_or(ProbeOutcome::Reachable)
        }
    }
}

/// Records every signal a handle emits
#[derive(Clone, Default)]
pub struct SignalRecorder {
    seen: Arc<Mutex<Vec<TransportSignal>>>,
}

impl SignalRecorder {
    /// Subscribe to every channel of `handle`
    pub fn attach(handle: &TransportHandle) -> Self {
        let recorder = Self::default();
        for channel in Channel::ALL {
            let seen = Arc::clone(&recorder.seen);
            handle.subscribe(channel, move |signal| lock(&seen).push(signal.clone()));
        }
        recorder
    }

    pub fn signals(&self) -> Vec<TransportSignal> {
        lock(&self.seen).clone()
    }

    pub fn on(&self, channel: Channel) -> Vec<TransportSignal> {
        lock(&self.seen)
            .iter()
            .filter(|s| s.channel() == channel)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.seen).clear();
    }
}
