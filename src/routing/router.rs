//! Typed fan-out of inbound frames
//!
//! The router holds the single `event` listener on the transport handle,
//! decodes each frame into a [`DomainEvent`], and hands it to the registered
//! subscribers in registration order. Frames that fail to decode stop here.
//!
//! ```text
//! TransportHandle ──event──▶ EventRouter ──DomainEvent──▶ subscribers
//! ```

use crate::protocol::{DomainEvent, EventDecodeError, EventKind};
use crate::router_span;
use crate::transport::{Channel, ListenerId, TransportHandle, TransportSignal};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub type EventHandler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Which event kinds a subscriber wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Kinds(HashSet<EventKind>),
}

impl EventFilter {
    pub fn only<I: IntoIterator<Item = EventKind>>(kinds: I) -> Self {
        EventFilter::Kinds(kinds.into_iter().collect())
    }

    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

/// Result of routing one frame
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Handed to this many subscribers
    Delivered(usize),
    /// Valid, but nobody is registered for it
    Dropped,
    /// Could not be decoded; never reaches a subscriber
    Rejected(EventDecodeError),
}

struct Subscriber {
    key: String,
    filter: EventFilter,
    handler: EventHandler,
}

/// Routes decoded events to at most one handler per subscriber key
#[derive(Clone, Default)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    subscribers: Mutex<Vec<Subscriber>>,
    listener: Mutex<Option<ListenerId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RouterInner {
    fn dispatch(&self, frame: &str) -> DispatchOutcome {
        match DomainEvent::decode(frame) {
            Ok(event) => self.deliver(&event),
            Err(e) => {
                warn!(error = %e, "Rejected inbound event");
                DispatchOutcome::Rejected(e)
            }
        }
    }

    fn deliver(&self, event: &DomainEvent) -> DispatchOutcome {
        let kind = event.kind();
        let _span = router_span!(kind = %kind).entered();

        let targets: Vec<EventHandler> = lock(&self.subscribers)
            .iter()
            .filter(|s| s.filter.matches(kind))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        if targets.is_empty() {
            debug!("No subscriber registered, event dropped");
            return DispatchOutcome::Dropped;
        }
        for handler in &targets {
            handler(event);
        }
        DispatchOutcome::Delivered(targets.len())
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the router's listener on the `event` channel; a second call is a no-op
    pub fn attach(&self, handle: &TransportHandle) {
        let mut listener = lock(&self.inner.listener);
        if listener.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let id = handle.subscribe(Channel::Event, move |signal| {
            if let TransportSignal::Event(frame) = signal {
                inner.dispatch(frame);
            }
        });
        *listener = Some(id);
    }

    /// Remove the router's listener from the handle
    pub fn detach(&self, handle: &TransportHandle) -> bool {
        match lock(&self.inner.listener).take() {
            Some(id) => handle.unsubscribe(Channel::Event, id),
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.inner.listener).is_some()
    }

    /// Register `handler` under `key`
    ///
    /// An existing registration for the same key is replaced in place and its
    /// filter returned, so a remounted consumer never receives duplicates.
    pub fn register<F>(
        &self,
        key: impl Into<String>,
        filter: EventFilter,
        handler: F,
    ) -> Option<EventFilter>
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let key = key.into();
        let handler: EventHandler = Arc::new(handler);
        let mut subscribers = lock(&self.inner.subscribers);

        if let Some(existing) = subscribers.iter_mut().find(|s| s.key == key) {
            debug!(subscriber = %key, "Replacing event subscriber");
            existing.handler = handler;
            return Some(std::mem::replace(&mut existing.filter, filter));
        }
        debug!(subscriber = %key, "Registering event subscriber");
        subscribers.push(Subscriber {
            key,
            filter,
            handler,
        });
        None
    }

    /// Remove the subscriber registered under `key`
    pub fn unregister(&self, key: &str) -> bool {
        let mut subscribers = lock(&self.inner.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.key != key);
        before != subscribers.len()
    }

    pub fn subscriber_keys(&self) -> Vec<String> {
        lock(&self.inner.subscribers)
            .iter()
            .map(|s| s.key.clone())
            .collect()
    }

    /// Decode and route one raw frame
    pub fn dispatch(&self, frame: &str) -> DispatchOutcome {
        self.inner.dispatch(frame)
    }

    /// Route an already decoded event
    pub fn deliver(&self, event: &DomainEvent) -> DispatchOutcome {
        self.inner.deliver(event)
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("subscribers", &self.subscriber_keys())
            .field("attached", &self.is_attached())
            .finish()
    }
}
