//! Reconnection policy for the persistent channel
//!
//! Pure functions only: the supervisor in [`super::handle`] asks the policy what
//! to do after each failure and does the waiting itself.

use std::time::Duration;

/// Exponential backoff schedule with a retry budget
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Automatic retries per connection cycle (0 disables automatic retry)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(5_000),
            max_attempts: 10,
        }
    }
}

/// What the supervisor should do after a failure
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectionDecision {
    /// Wait `delay`, then make retry number `attempt`
    Retry { attempt: u32, delay: Duration },
    /// Retry budget exhausted after `attempts` automatic retries
    GiveUp { attempts: u32 },
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based), doubling and clamped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide given the consecutive failures since the last successful connection
    ///
    /// An unexpected drop of a live connection counts as the first failure of a
    /// new cycle. Failures beyond `max_attempts` give up.
    pub fn decide(&self, consecutive_failures: u32) -> ReconnectionDecision {
        let attempt = consecutive_failures.max(1);
        if attempt > self.max_attempts {
            return ReconnectionDecision::GiveUp {
                attempts: self.max_attempts,
            };
        }
        ReconnectionDecision::Retry {
            attempt,
            delay: self.delay_for(attempt),
        }
    }

    /// Whether a failure count still leaves room for an automatic retry
    pub fn permits_retry(&self, consecutive_failures: u32) -> bool {
        matches!(
            self.decide(consecutive_failures),
            ReconnectionDecision::Retry { .. }
        )
    }

    /// Sum of all delays in one full cycle
    pub fn total_budget(&self) -> Duration {
        (1..=self.max_attempts).map(|a| self.delay_for(a)).sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("reconnection initial delay must be greater than 0".to_string());
        }
        if self.initial_delay > self.max_delay {
            return Err(format!(
                "reconnection initial delay ({:?}) exceeds max delay ({:?})",
                self.initial_delay, self.max_delay
            ));
        }
        Ok(())
    }
}
