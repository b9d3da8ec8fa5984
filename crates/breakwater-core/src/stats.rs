//! Circuit state and the persisted per-service stats record.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Circuit State
// ============================================================================

/// Current state of a circuit breaker.
///
/// Serializes as `CLOSED` / `OPEN` / `HALF_OPEN` on the wire so peers using
/// a different implementation read the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,

    /// Calls are rejected immediately without invoking the service.
    Open,

    /// Trial window; a bounded number of calls probe recovery.
    HalfOpen,
}

impl CircuitState {
    /// Check if requests are allowed in current state.
    pub fn allows_requests(&self) -> bool {
        matches!(self, Self::Closed | Self::HalfOpen)
    }

    /// Check if the circuit is in a failure state.
    pub fn is_failure_state(&self) -> bool {
        matches!(self, Self::Open | Self::HalfOpen)
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::Closed
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        };
        write!(f, "{}", label)
    }
}

// ============================================================================
// Service Stats
// ============================================================================

/// The persisted stats record for one service key.
///
/// This is the wire contract shared by every caller observing the same
/// store: field names serialize in camelCase, timestamps as RFC 3339
/// strings, and absent optional fields deserialize to `None` / zero.
///
/// `total_requests`, `successful_requests`, and `failed_requests` are
/// monotonic over the lifetime of a key and survive state transitions;
/// only an explicit store reset clears counters. `current_load`,
/// `average_response_time`, and `last_minute_requests` are advisory
/// present-value fields refreshed by whichever caller wrote last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceStats {
    pub state: CircuitState,

    /// Consecutive failures observed in closed state; reset on entering
    /// closed or half-open.
    pub failure_count: u32,

    pub last_failure_time: Option<Timestamp>,
    pub last_success_time: Option<Timestamp>,
    pub last_update_time: Option<Timestamp>,
    pub last_error: Option<String>,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    pub current_load: u32,
    pub average_response_time: f64,
    pub last_minute_requests: u64,
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            last_success_time: None,
            last_update_time: None,
            last_error: None,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            current_load: 0,
            average_response_time: 0.0,
            last_minute_requests: 0,
        }
    }
}

impl ServiceStats {
    /// Record for a key observed for the first time: closed, zero counters,
    /// last success stamped now.
    pub fn fresh() -> Self {
        Self {
            last_success_time: Some(Timestamp::now()),
            ..Self::default()
        }
    }

    /// Check whether the open cool-down has elapsed.
    ///
    /// An open record without a failure timestamp is treated as cooled so
    /// that recovery is still possible if the invariant was violated by a
    /// peer.
    pub fn cool_down_elapsed(&self, reset_timeout: std::time::Duration) -> bool {
        match self.last_failure_time {
            Some(last_failure) => last_failure.elapsed() >= reset_timeout,
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
