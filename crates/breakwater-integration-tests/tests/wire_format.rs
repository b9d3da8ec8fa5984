//! Tests for the persisted wire format shared with cross-language peers.

use breakwater_core::{
    CircuitState, InMemoryStateStore, ServiceStats, StateStore, Timestamp,
};
use serde_json::Value;
use std::sync::Arc;

/// Verify a record written by a peer implementation parses into the exact
/// field values.
#[tokio::test]
async fn test_peer_record_parses() {
    let raw = r#"{
        "state": "OPEN",
        "failureCount": 5,
        "lastFailureTime": "2026-03-01T12:00:00Z",
        "lastSuccessTime": "2026-03-01T11:55:00Z",
        "lastUpdateTime": "2026-03-01T12:00:01Z",
        "lastError": "Service timeout",
        "totalRequests": 120,
        "successfulRequests": 100,
        "failedRequests": 20,
        "currentLoad": 3,
        "averageResponseTime": 41.5,
        "lastMinuteRequests": 12
    }"#;

    let stats: ServiceStats = serde_json::from_str(raw).unwrap();

    assert_eq!(stats.state, CircuitState::Open);
    assert_eq!(stats.failure_count, 5);
    assert_eq!(stats.last_error.as_deref(), Some("Service timeout"));
    assert_eq!(stats.total_requests, 120);
    assert_eq!(stats.successful_requests, 100);
    assert_eq!(stats.failed_requests, 20);
    assert_eq!(stats.current_load, 3);
    assert_eq!(stats.average_response_time, 41.5);
    assert_eq!(stats.last_minute_requests, 12);

    let expected: Timestamp = "2026-03-01T12:00:00Z".parse().unwrap();
    assert_eq!(stats.last_failure_time, Some(expected));
}

/// Verify a sparse peer record still parses, with absent fields at their
/// null / zero defaults.
#[tokio::test]
async fn test_sparse_peer_record_parses() {
    let stats: ServiceStats =
        serde_json::from_str(r#"{"state": "HALF_OPEN", "failureCount": 1}"#).unwrap();

    assert_eq!(stats.state, CircuitState::HalfOpen);
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.total_requests, 0);
    assert!(stats.last_failure_time.is_none());
    assert!(stats.last_error.is_none());
}

/// Verify the serialized form uses the shared camelCase field names and the
/// SCREAMING_SNAKE_CASE state encoding.
#[tokio::test]
async fn test_serialized_form_is_canonical() {
    let stats = ServiceStats {
        state: CircuitState::Open,
        failure_count: 2,
        last_error: Some("boom".to_string()),
        total_requests: 7,
        ..ServiceStats::default()
    };

    let value: Value = serde_json::to_value(&stats).unwrap();

    assert_eq!(value["state"], "OPEN");
    assert_eq!(value["failureCount"], 2);
    assert_eq!(value["totalRequests"], 7);
    assert_eq!(value["lastError"], "boom");
    // Absent instants serialize as nulls, not missing structure
    assert!(value.get("lastFailureTime").is_some());
}

/// Verify the store round-trips a record through its serialized form
/// unchanged.
#[tokio::test]
async fn test_store_round_trip_preserves_record() {
    let store = Arc::new(InMemoryStateStore::new());
    let stats = ServiceStats {
        state: CircuitState::HalfOpen,
        failure_count: 0,
        last_success_time: Some(Timestamp::now()),
        total_requests: 9,
        successful_requests: 6,
        failed_requests: 3,
        average_response_time: 12.25,
        ..ServiceStats::default()
    };

    store.put("payments", &stats).await.unwrap();
    let loaded = store.get("payments").await.unwrap().unwrap();

    assert_eq!(loaded, stats);
}
