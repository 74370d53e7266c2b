//! Display vocabulary for the connection state

use crate::transport::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Positive,
    Pending,
    Critical,
}

/// Label and tone shown for a [`ConnectionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBadge {
    pub label: &'static str,
    pub tone: StatusTone,
}

impl From<ConnectionState> for StatusBadge {
    fn from(state: ConnectionState) -> Self {
        let (label, tone) = match state {
            ConnectionState::Connected => ("Connected", StatusTone::Positive),
            ConnectionState::Connecting => ("Connecting...", StatusTone::Pending),
            ConnectionState::Reconnecting => ("Reconnecting...", StatusTone::Pending),
            ConnectionState::Disconnected => ("Disconnected", StatusTone::Critical),
        };
        Self { label, tone }
    }
}

impl std::fmt::Display for StatusBadge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_vocabulary() {
        let cases = [
            (ConnectionState::Connected, "Connected", StatusTone::Positive),
            (ConnectionState::Connecting, "Connecting...", StatusTone::Pending),
            (ConnectionState::Reconnecting, "Reconnecting...", StatusTone::Pending),
            (ConnectionState::Disconnected, "Disconnected", StatusTone::Critical),
        ];
        for (state, label, tone) in cases {
            let badge = StatusBadge::from(state);
            assert_eq!(badge.label, label);
            assert_eq!(badge.tone, tone, "state: {state}");
        }
    }
}
