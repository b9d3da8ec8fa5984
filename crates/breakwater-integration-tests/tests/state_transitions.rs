//! End-to-end tests for the trip and recovery cycle of a single breaker.

mod common;

use breakwater_core::{
    Breaker, BreakerError, CircuitState, EventKind, InMemoryStateStore, StateStore,
};
use common::{scenario_options, DownstreamError, EventRecorder};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

async fn create_breaker(
    failure_threshold: u32,
    reset_timeout: Duration,
) -> (Arc<Breaker>, Arc<InMemoryStateStore>) {
    let store = Arc::new(InMemoryStateStore::new());
    let breaker = Breaker::new(
        "payments",
        Arc::clone(&store) as Arc<dyn StateStore>,
        scenario_options(failure_threshold, reset_timeout),
    )
    .await
    .unwrap();
    (breaker, store)
}

/// Verify the circuit trips exactly at the failure threshold.
///
/// Three failing calls against a threshold of three must leave the persisted
/// record open with matching counters, emit a single circuit-open event, and
/// reject the fourth call without invoking it.
#[tokio::test]
async fn test_trip_on_threshold() {
    // Arrange
    common::init_tracing();
    let (breaker, _store) = create_breaker(3, Duration::from_secs(1)).await;
    let recorder = EventRecorder::new();
    breaker.subscribe(EventKind::StateChange, recorder.listener());
    breaker.subscribe(EventKind::CircuitOpen, recorder.listener());

    // Act
    for _ in 0..3 {
        let result = breaker
            .execute(|| async { Err::<String, _>(DownstreamError::new("boom")) })
            .await;
        assert!(matches!(result, Err(BreakerError::ServiceError(_))));
    }

    // Assert
    let stats = breaker.get_stats().await.unwrap().unwrap();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.failure_count, 3);
    assert_eq!(stats.failed_requests, 3);
    assert_eq!(stats.total_requests, 3);

    assert_eq!(recorder.count_of(EventKind::CircuitOpen), 1);
    assert_eq!(
        recorder.state_changes(),
        vec![(CircuitState::Closed, CircuitState::Open)]
    );

    // A fourth call is rejected without invoking the thunk
    let invocations = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invocations);
    let rejected = breaker
        .execute(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DownstreamError>("unreachable")
        })
        .await;
    assert!(matches!(rejected, Err(BreakerError::CircuitOpen { .. })));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

/// Verify recovery: the health loop moves the circuit to half-open once the
/// cool-down elapses, and one successful probe closes it.
#[tokio::test]
async fn test_recovery_after_cool_down() {
    // Arrange: trip the circuit
    let (breaker, _store) = create_breaker(3, Duration::from_secs(1)).await;
    for _ in 0..3 {
        let _ = breaker
            .execute(|| async { Err::<String, _>(DownstreamError::new("boom")) })
            .await;
    }
    assert_eq!(
        breaker.get_stats().await.unwrap().unwrap().state,
        CircuitState::Open
    );

    // Act: wait past the cool-down plus one health-check period (500ms)
    sleep(Duration::from_secs(1) + Duration::from_millis(700)).await;

    // Assert: the health loop observed the elapsed cool-down
    let stats = breaker.get_stats().await.unwrap().unwrap();
    assert_eq!(stats.state, CircuitState::HalfOpen);
    assert_eq!(stats.failure_count, 0);

    // One successful probe closes the circuit
    let result = breaker
        .execute(|| async { Ok::<_, DownstreamError>("recovered") })
        .await;
    assert_eq!(result.unwrap(), "recovered");

    let stats = breaker.get_stats().await.unwrap().unwrap();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failure_count, 0);
}

/// Verify a failed probe sends the circuit straight back to open.
#[tokio::test]
async fn test_failed_probe_reopens() {
    // Arrange: trip, then wait for half-open
    let (breaker, _store) = create_breaker(1, Duration::from_millis(400)).await;
    let _ = breaker
        .execute(|| async { Err::<String, _>(DownstreamError::new("boom")) })
        .await;
    sleep(Duration::from_millis(800)).await;
    assert_eq!(
        breaker.get_stats().await.unwrap().unwrap().state,
        CircuitState::HalfOpen
    );

    // Act
    let result = breaker
        .execute(|| async { Err::<String, _>(DownstreamError::new("still broken")) })
        .await;
    assert!(matches!(result, Err(BreakerError::ServiceError(_))));

    // Assert
    let stats = breaker.get_stats().await.unwrap().unwrap();
    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.last_error.as_deref(), Some("still broken"));
}

/// Verify lifetime totals stay monotonic across a trip-and-recover cycle.
#[tokio::test]
async fn test_totals_survive_recovery() {
    let (breaker, _store) = create_breaker(2, Duration::from_millis(400)).await;

    let _ = breaker
        .execute(|| async { Ok::<_, DownstreamError>("ok") })
        .await;
    for _ in 0..2 {
        let _ = breaker
            .execute(|| async { Err::<String, _>(DownstreamError::new("boom")) })
            .await;
    }
    sleep(Duration::from_millis(800)).await;
    let _ = breaker
        .execute(|| async { Ok::<_, DownstreamError>("ok") })
        .await;

    let stats = breaker.get_stats().await.unwrap().unwrap();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.successful_requests, 2);
    assert_eq!(stats.failed_requests, 2);
    assert_eq!(stats.total_requests, 4);
    assert!(stats.total_requests >= stats.successful_requests + stats.failed_requests);
}

/// Verify stopping the breaker is idempotent and leaves the record alone.
#[tokio::test]
async fn test_stop_is_idempotent() {
    let (breaker, _store) = create_breaker(3, Duration::from_secs(1)).await;
    let _ = breaker
        .execute(|| async { Ok::<_, DownstreamError>("ok") })
        .await;

    breaker.stop();
    breaker.stop();

    let stats = breaker.get_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.state, CircuitState::Closed);
}
