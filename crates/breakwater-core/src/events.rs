//! Breaker event payloads and the per-kind dispatcher.
//!
//! Delivery is synchronous from the emitting site; per-subscriber order is
//! preserved. Listeners must not block.

use crate::metrics::MetricsSnapshot;
use crate::stats::{CircuitState, ServiceStats};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

// ============================================================================
// Event Types
// ============================================================================

/// Event kinds a breaker publishes; the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChange,
    CircuitOpen,
    Failure,
    Success,
    Timeout,
    Rejected,
    Metrics,
    HealthCheck,
    StateUpdate,
}

/// An event published by a breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// A state transition was persisted.
    StateChange {
        from: CircuitState,
        to: CircuitState,
    },

    /// The circuit tripped open. Edge-triggered: emitted exactly once per
    /// transition into the open state.
    CircuitOpen { error: String },

    /// A protected call failed and was counted.
    Failure { error: String, stats: ServiceStats },

    /// A protected call succeeded.
    Success {
        response_time: Duration,
        stats: ServiceStats,
    },

    /// A protected call exceeded the service timeout.
    Timeout { error: String, stats: ServiceStats },

    /// A call was rejected at admission (open circuit or overload).
    Rejected { error: String, stats: ServiceStats },

    /// Periodic snapshot of the in-memory metrics window.
    Metrics { snapshot: MetricsSnapshot },

    /// The health-check loop completed a tick.
    HealthCheck { stats: ServiceStats },

    /// The persisted record changed, observed through the store watch.
    StateUpdate { stats: ServiceStats },
}

impl BreakerEvent {
    /// The kind used to route this event to subscribers.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChange { .. } => EventKind::StateChange,
            Self::CircuitOpen { .. } => EventKind::CircuitOpen,
            Self::Failure { .. } => EventKind::Failure,
            Self::Success { .. } => EventKind::Success,
            Self::Timeout { .. } => EventKind::Timeout,
            Self::Rejected { .. } => EventKind::Rejected,
            Self::Metrics { .. } => EventKind::Metrics,
            Self::HealthCheck { .. } => EventKind::HealthCheck,
            Self::StateUpdate { .. } => EventKind::StateUpdate,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// A subscribed event listener.
pub type Listener = Arc<dyn Fn(&BreakerEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`], used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Subscriber registry keyed by event kind.
///
/// Listeners for a kind are invoked in subscription order; emission clones
/// the listener list so subscribers can detach from inside a callback.
pub struct EventDispatcher {
    subscribers: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a listener for one event kind.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.subscribers
            .write()
            .unwrap()
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    /// Detach a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap();
        match subscribers.get_mut(&kind) {
            Some(listeners) => {
                let before = listeners.len();
                listeners.retain(|(listener_id, _)| *listener_id != id);
                listeners.len() != before
            }
            None => false,
        }
    }

    /// Deliver an event to every listener subscribed to its kind.
    pub fn emit(&self, event: &BreakerEvent) {
        let listeners: Vec<Listener> = {
            let subscribers = self.subscribers.read().unwrap();
            match subscribers.get(&event.kind()) {
                Some(listeners) => listeners
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect(),
                None => return,
            }
        };

        for listener in listeners {
            listener(event);
        }
    }

    /// Number of listeners attached for a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .unwrap()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
