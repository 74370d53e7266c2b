//! Inbound domain events and their wire envelope
//!
//! Every frame on the persistent channel is a JSON object of the form
//! `{"type": "<tag>", "payload": {...}}`. The tag set is closed: a frame whose
//! tag is not one of [`EventKind::ALL`] is rejected, never coerced.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a bet ticket
///
/// Accepts the lowercase form as well as the capitalised and upper-case
/// spellings the backend has used for the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    #[serde(alias = "Pending", alias = "PENDING")]
    Pending,
    #[serde(alias = "Validated", alias = "VALIDATED")]
    Validated,
    #[serde(alias = "Rejected", alias = "REJECTED")]
    Rejected,
}

/// Final outcome carried by a bet event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Validated,
    Rejected,
}

impl From<OutcomeStatus> for BetStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Validated => BetStatus::Validated,
            OutcomeStatus::Rejected => BetStatus::Rejected,
        }
    }
}

/// Status of a match on the live board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Finished,
    Suspended,
}

/// Immutable bet ticket value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetTicket {
    pub user_id: Uuid,
    pub match_id: Uuid,
    pub amount: f64,
    pub odds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BetStatus>,
}

impl BetTicket {
    /// Copy of this ticket carrying the given status
    pub fn with_status(&self, status: BetStatus) -> Self {
        Self {
            status: Some(status),
            ..self.clone()
        }
    }

    /// Check the value invariants: positive finite amount, finite odds
    pub fn check(&self) -> Result<(), String> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        if !self.odds.is_finite() {
            return Err(format!("odds must be finite, got {}", self.odds));
        }
        Ok(())
    }
}

/// Discriminant of a [`DomainEvent`], one per wire tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    BetValidated,
    BetRejected,
    OddsUpdated,
    MatchStatusChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::BetValidated,
        EventKind::BetRejected,
        EventKind::OddsUpdated,
        EventKind::MatchStatusChanged,
    ];

    /// Wire tag for this kind
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::BetValidated => "bet:validated",
            EventKind::BetRejected => "bet:rejected",
            EventKind::OddsUpdated => "odds:updated",
            EventKind::MatchStatusChanged => "match:status_changed",
        }
    }

    /// Look up a kind by wire tag; `None` for anything outside the closed set
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Typed inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    BetOutcome {
        status: OutcomeStatus,
        ticket: BetTicket,
    },
    OddsUpdate {
        match_id: String,
        odds: f64,
    },
    MatchStatusChange {
        match_id: String,
        status: MatchStatus,
    },
}

#[derive(Deserialize)]
struct OddsPayload {
    match_id: String,
    odds: f64,
}

#[derive(Deserialize)]
struct MatchStatusPayload {
    match_id: String,
    status: MatchStatus,
}

/// Reasons an inbound frame is rejected at the router boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventDecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("frame has no string \"type\" tag")]
    MissingTag,
    #[error("unrecognized event tag: {0}")]
    UnknownTag(String),
    #[error("malformed payload for {kind}: {reason}")]
    MalformedPayload { kind: EventKind, reason: String },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::BetOutcome {
                status: OutcomeStatus::Validated,
                ..
            } => EventKind::BetValidated,
            DomainEvent::BetOutcome {
                status: OutcomeStatus::Rejected,
                ..
            } => EventKind::BetRejected,
            DomainEvent::OddsUpdate { .. } => EventKind::OddsUpdated,
            DomainEvent::MatchStatusChange { .. } => EventKind::MatchStatusChanged,
        }
    }

    /// Decode a raw text frame
    pub fn decode(frame: &str) -> Result<Self, EventDecodeError> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| EventDecodeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode an already parsed envelope
    pub fn from_value(mut value: Value) -> Result<Self, EventDecodeError> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventDecodeError::MissingTag)?
            .to_string();
        let kind =
            EventKind::from_tag(&tag).ok_or_else(|| EventDecodeError::UnknownTag(tag.clone()))?;
        let payload = value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);

        let malformed = |reason: String| EventDecodeError::MalformedPayload { kind, reason };

        match kind {
            EventKind::BetValidated | EventKind::BetRejected => {
                let status = if kind == EventKind::BetValidated {
                    OutcomeStatus::Validated
                } else {
                    OutcomeStatus::Rejected
                };
                let ticket: BetTicket =
                    serde_json::from_value(payload).map_err(|e| malformed(e.to_string()))?;
                ticket.check().map_err(malformed)?;
                match ticket.status {
                    Some(carried) if carried != BetStatus::from(status) => Err(malformed(format!(
                        "ticket status {carried:?} disagrees with tag"
                    ))),
                    _ => Ok(DomainEvent::BetOutcome {
                        status,
                        ticket: ticket.with_status(status.into()),
                    }),
                }
            }
            EventKind::OddsUpdated => {
                let body: OddsPayload =
                    serde_json::from_value(payload).map_err(|e| malformed(e.to_string()))?;
                if !body.odds.is_finite() {
                    return Err(malformed(format!("odds must be finite, got {}", body.odds)));
                }
                Ok(DomainEvent::OddsUpdate {
                    match_id: body.match_id,
                    odds: body.odds,
                })
            }
            EventKind::MatchStatusChanged => {
                let body: MatchStatusPayload =
                    serde_json::from_value(payload).map_err(|e| malformed(e.to_string()))?;
                Ok(DomainEvent::MatchStatusChange {
                    match_id: body.match_id,
                    status: body.status,
                })
            }
        }
    }

    /// Encode back into the wire envelope
    pub fn to_wire(&self) -> Value {
        let payload = match self {
            DomainEvent::BetOutcome { ticket, .. } => json!(ticket),
            DomainEvent::OddsUpdate { match_id, odds } => {
                json!({ "match_id": match_id, "odds": odds })
            }
            DomainEvent::MatchStatusChange { match_id, status } => {
                json!({ "match_id": match_id, "status": status })
            }
        };
        json!({ "type": self.kind().tag(), "payload": payload })
    }
}
