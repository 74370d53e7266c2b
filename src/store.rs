//! Reactive application state
//!
//! [`ApplicationStore`] wraps a `watch` channel: every mutation updates the
//! state in place and wakes subscribers. Writers are the event router, the
//! health poller and completed user requests; nothing here touches the network.

use crate::protocol::{BetTicket, DomainEvent, EventKind, MatchStatus};
use crate::routing::{EventFilter, EventRouter};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub const DEFAULT_ACTIVITY_LOG_CAPACITY: usize = 8;

/// Subscriber key used by [`bind_router`]
pub const STORE_SUBSCRIBER: &str = "store";

/// Round to two decimals, halves away from zero
pub fn round_latency(latency_ms: f64) -> f64 {
    (latency_ms * 100.0).round() / 100.0
}

/// One completed bet request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// ISO-8601 timestamp
    pub timestamp: String,
    pub amount: f64,
    /// Round-trip latency, two decimals
    pub latency_ms: f64,
}

impl ActivityLogEntry {
    pub fn new(timestamp: impl Into<String>, amount: f64, latency_ms: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            amount,
            latency_ms: round_latency(latency_ms),
        }
    }

    /// Entry stamped with the current UTC time
    pub fn now(amount: f64, latency_ms: f64) -> Self {
        Self::new(
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            amount,
            latency_ms,
        )
    }
}

/// Bounded log, most recent first
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLog {
    entries: VecDeque<ActivityLogEntry>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_LOG_CAPACITY)
    }
}

impl ActivityLog {
    /// A zero capacity is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert as newest; the oldest entry is evicted once full
    pub fn push(&mut self, entry: ActivityLogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn newest(&self) -> Option<&ActivityLogEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityLogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<ActivityLogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Latest odds and match status per match id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveBoard {
    pub odds: HashMap<String, f64>,
    pub match_status: HashMap<String, MatchStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreState {
    pub last_bet: Option<BetTicket>,
    pub activity_log: ActivityLog,
    pub online: bool,
    pub board: LiveBoard,
}

impl StoreState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            last_bet: None,
            activity_log: ActivityLog::with_capacity(capacity),
            online: false,
            board: LiveBoard::default(),
        }
    }
}

impl Default for StoreState {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_LOG_CAPACITY)
    }
}

/// Cheaply cloned handle to the shared state
#[derive(Debug, Clone)]
pub struct ApplicationStore {
    state: Arc<watch::Sender<StoreState>>,
}

impl Default for ApplicationStore {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_LOG_CAPACITY)
    }
}

impl ApplicationStore {
    pub fn new(activity_log_capacity: usize) -> Self {
        let (state, _) = watch::channel(StoreState::with_capacity(activity_log_capacity));
        Self {
            state: Arc::new(state),
        }
    }

    /// Change notifications; the receiver always sees the latest state
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn online(&self) -> bool {
        self.state.borrow().online
    }

    pub fn last_bet(&self) -> Option<BetTicket> {
        self.state.borrow().last_bet.clone()
    }

    pub fn activity_log(&self) -> Vec<ActivityLogEntry> {
        self.state.borrow().activity_log.to_vec()
    }

    pub fn add_log_entry(&self, entry: ActivityLogEntry) {
        self.state.send_modify(|s| s.activity_log.push(entry));
    }

    pub fn set_last_bet(&self, ticket: BetTicket) {
        self.state.send_modify(|s| s.last_bet = Some(ticket));
    }

    /// Overwrite the online flag and return the previous value
    ///
    /// Subscribers are only woken when the value actually changes.
    pub fn set_online(&self, online: bool) -> bool {
        let mut previous = online;
        self.state.send_if_modified(|s| {
            previous = s.online;
            s.online = online;
            previous != online
        });
        previous
    }

    pub fn clear_log(&self) {
        self.state.send_modify(|s| s.activity_log.clear());
    }

    pub fn apply_odds(&self, match_id: &str, odds: f64) {
        self.state.send_modify(|s| {
            s.board.odds.insert(match_id.to_string(), odds);
        });
    }

    pub fn apply_match_status(&self, match_id: &str, status: MatchStatus) {
        self.state.send_modify(|s| {
            s.board.match_status.insert(match_id.to_string(), status);
        });
    }

    /// Apply one routed event
    pub fn apply_event(&self, event: &DomainEvent) {
        match event {
            DomainEvent::BetOutcome { ticket, .. } => self.set_last_bet(ticket.clone()),
            DomainEvent::OddsUpdate { match_id, odds } => self.apply_odds(match_id, *odds),
            DomainEvent::MatchStatusChange { match_id, status } => {
                self.apply_match_status(match_id, *status)
            }
        }
    }
}

/// Register the store as the `store` subscriber of `router`
pub fn bind_router(router: &EventRouter, store: &ApplicationStore) {
    let store = store.clone();
    router.register(
        STORE_SUBSCRIBER,
        EventFilter::only(EventKind::ALL),
        move |event| {
            debug!(kind = %event.kind(), "Applying event to store");
            store.apply_event(event);
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BetStatus;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn ticket(amount: f64) -> BetTicket {
        BetTicket {
            user_id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            amount,
            odds: 1.8,
            status: Some(BetStatus::Validated),
        }
    }

    #[test]
    fn test_latency_rounded_to_two_decimals() {
        let store = ApplicationStore::default();
        store.add_log_entry(ActivityLogEntry::new("2024-05-01T12:00:00Z", 10.50, 12.345));

        let log = store.activity_log();
        assert_eq!(log[0].latency_ms, 12.35);
        assert_eq!(log[0].amount, 10.50);
    }

    #[test]
    fn test_round_latency() {
        assert_eq!(round_latency(0.004), 0.0);
        assert_eq!(round_latency(99.999), 100.0);
        assert_eq!(round_latency(7.0), 7.0);
    }

    #[test]
    fn test_ninth_entry_evicts_oldest() {
        let mut log = ActivityLog::default();
        for i in 0..9 {
            log.push(ActivityLogEntry::new(format!("t{i}"), i as f64, 1.0));
        }
        assert_eq!(log.len(), 8);
        assert_eq!(log.newest().unwrap().timestamp, "t8");
        assert!(log.iter().all(|e| e.timestamp != "t0"));
    }

    #[test]
    fn test_now_uses_rfc3339() {
        let entry = ActivityLogEntry::now(5.0, 3.0);
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
    }

    #[test]
    fn test_initial_state() {
        let state = ApplicationStore::default().snapshot();
        assert!(!state.online);
        assert!(state.last_bet.is_none());
        assert!(state.activity_log.is_empty());
        assert_eq!(state.activity_log.capacity(), 8);
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let mut log = ActivityLog::with_capacity(0);
        log.push(ActivityLogEntry::new("a", 1.0, 1.0));
        log.push(ActivityLogEntry::new("b", 1.0, 1.0));
        assert_eq!(log.to_vec().len(), 1);
        assert_eq!(log.newest().unwrap().timestamp, "b");
    }

    #[test]
    fn test_set_online_returns_previous() {
        let store = ApplicationStore::default();
        assert!(!store.set_online(true));
        assert!(store.set_online(true));
        assert!(store.set_online(false));
        assert!(!store.online());
    }

    #[tokio::test]
    async fn test_set_online_notifies_only_on_change() {
        let store = ApplicationStore::default();
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.set_online(false);
        assert!(!rx.has_changed().unwrap());

        store.set_online(true);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_clear_log_keeps_other_state() {
        let store = ApplicationStore::default();
        store.set_last_bet(ticket(10.0));
        store.add_log_entry(ActivityLogEntry::new("t", 10.0, 1.0));
        store.clear_log();

        let state = store.snapshot();
        assert!(state.activity_log.is_empty());
        assert!(state.last_bet.is_some());
    }

    #[test]
    fn test_bind_router_applies_events() {
        let router = EventRouter::new();
        let store = ApplicationStore::default();
        bind_router(&router, &store);

        router.dispatch(
            &serde_json::json!({"type": "odds:updated", "payload": {"match_id": "m1", "odds": 2.5}})
                .to_string(),
        );
        router.dispatch(
            &serde_json::json!({
                "type": "match:status_changed",
                "payload": {"match_id": "m1", "status": "suspended"}
            })
            .to_string(),
        );
        let bet = ticket(25.0);
        router.deliver(&DomainEvent::BetOutcome {
            status: crate::protocol::OutcomeStatus::Validated,
            ticket: bet.clone(),
        });

        let state = store.snapshot();
        assert_eq!(state.board.odds.get("m1"), Some(&2.5));
        assert_eq!(
            state.board.match_status.get("m1"),
            Some(&MatchStatus::Suspended)
        );
        assert_eq!(state.last_bet, Some(bet));
    }

    proptest! {
        #[test]
        fn activity_log_keeps_last_eight_newest_first(
            amounts in proptest::collection::vec(0.01f64..1_000.0, 0..40)
        ) {
            let mut log = ActivityLog::default();
            for (i, amount) in amounts.iter().enumerate() {
                log.push(ActivityLogEntry::new(format!("t{i}"), *amount, 1.0));
            }

            let expected: Vec<String> = (0..amounts.len())
                .rev()
                .take(8)
                .map(|i| format!("t{i}"))
                .collect();
            let actual: Vec<String> = log.iter().map(|e| e.timestamp.clone()).collect();

            prop_assert_eq!(log.len(), amounts.len().min(8));
            prop_assert_eq!(actual, expected);
        }
    }
}
