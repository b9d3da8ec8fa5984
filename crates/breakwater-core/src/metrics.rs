//! Sliding-window request metrics kept in memory per breaker.
//!
//! The window tracks request and error marks over the trailing minute and a
//! bounded ring of response-time samples. It is owned exclusively by its
//! breaker; external callers only ever see [`MetricsSnapshot`] values.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Window over which request and error rates are computed.
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Marks older than this are pruned.
const RETENTION: Duration = Duration::from_secs(60);

/// Response-time samples contributing to the rolling average.
const RESPONSE_SAMPLE_CAP: usize = 100;

// ============================================================================
// Snapshot Types
// ============================================================================

/// Request totals over the trailing minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMinuteStats {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

/// Point-in-time view of a breaker's metrics window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Requests per second over the trailing five seconds.
    pub request_rate: f64,

    /// Errors per second over the trailing five seconds.
    pub error_rate: f64,

    /// Average of the last (at most) 100 response times, in milliseconds.
    pub average_response_time: f64,

    /// In-flight calls at snapshot time.
    pub current_load: usize,

    pub last_minute: LastMinuteStats,
}

// ============================================================================
// Metrics Window
// ============================================================================

/// Sliding-window counters for one breaker.
///
/// Marks are epoch-millisecond instants; pruning happens on every snapshot
/// and on every record so the deques stay bounded to the retention window.
#[derive(Debug)]
pub struct MetricsWindow {
    request_marks: VecDeque<i64>,
    error_marks: VecDeque<i64>,
    response_times: VecDeque<f64>,
}

impl MetricsWindow {
    pub fn new() -> Self {
        Self {
            request_marks: VecDeque::new(),
            error_marks: VecDeque::new(),
            response_times: VecDeque::new(),
        }
    }

    /// Record a request start.
    pub fn record_request(&mut self, at_ms: i64) {
        self.request_marks.push_back(at_ms);
        self.prune(at_ms);
    }

    /// Record a failed outcome.
    pub fn record_error(&mut self, at_ms: i64) {
        self.error_marks.push_back(at_ms);
        self.prune(at_ms);
    }

    /// Record a successful call's response time in milliseconds.
    pub fn record_response_time(&mut self, elapsed_ms: f64) {
        self.response_times.push_back(elapsed_ms);
        while self.response_times.len() > RESPONSE_SAMPLE_CAP {
            self.response_times.pop_front();
        }
    }

    /// Drop marks older than the retention window.
    pub fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - RETENTION.as_millis() as i64;
        while self.request_marks.front().is_some_and(|&mark| mark < cutoff) {
            self.request_marks.pop_front();
        }
        while self.error_marks.front().is_some_and(|&mark| mark < cutoff) {
            self.error_marks.pop_front();
        }
    }

    /// Prune and recompute the rolling statistics.
    pub fn snapshot(&mut self, now_ms: i64, current_load: usize) -> MetricsSnapshot {
        self.prune(now_ms);

        let rate_cutoff = now_ms - RATE_WINDOW.as_millis() as i64;
        let rate_seconds = RATE_WINDOW.as_secs_f64();
        let recent_requests = count_from(&self.request_marks, rate_cutoff);
        let recent_errors = count_from(&self.error_marks, rate_cutoff);

        let average_response_time = if self.response_times.is_empty() {
            0.0
        } else {
            self.response_times.iter().sum::<f64>() / self.response_times.len() as f64
        };

        let total = self.request_marks.len() as u64;
        let failure = self.error_marks.len() as u64;
        let last_minute = LastMinuteStats {
            total,
            success: total.saturating_sub(failure),
            failure,
        };

        MetricsSnapshot {
            request_rate: recent_requests as f64 / rate_seconds,
            error_rate: recent_errors as f64 / rate_seconds,
            average_response_time,
            current_load,
            last_minute,
        }
    }
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Count of marks at or after the cutoff. Marks are appended in time order,
/// so scanning from the back stops at the first stale entry.
fn count_from(marks: &VecDeque<i64>, cutoff: i64) -> usize {
    marks.iter().rev().take_while(|&&mark| mark >= cutoff).count()
}
