//! Tests for the sliding-window metrics calculator.

use super::*;

const NOW_MS: i64 = 1_000_000_000;

#[test]
fn test_empty_window_snapshot() {
    let mut window = MetricsWindow::new();
    let snapshot = window.snapshot(NOW_MS, 0);

    assert_eq!(snapshot.request_rate, 0.0);
    assert_eq!(snapshot.error_rate, 0.0);
    assert_eq!(snapshot.average_response_time, 0.0);
    assert_eq!(snapshot.current_load, 0);
    assert_eq!(snapshot.last_minute, LastMinuteStats::default());
}

#[test]
fn test_request_rate_counts_trailing_five_seconds() {
    let mut window = MetricsWindow::new();

    // Ten marks inside the rate window, five outside it but within retention
    for i in 0..10 {
        window.record_request(NOW_MS - 100 * i);
    }
    for i in 0..5 {
        window.record_request(NOW_MS - 10_000 - 100 * i);
    }

    let snapshot = window.snapshot(NOW_MS, 0);
    assert_eq!(snapshot.request_rate, 10.0 / 5.0);
    assert_eq!(snapshot.last_minute.total, 15);
}

#[test]
fn test_error_rate_counts_trailing_five_seconds() {
    let mut window = MetricsWindow::new();
    for i in 0..5 {
        window.record_request(NOW_MS - 100 * i);
    }
    window.record_error(NOW_MS - 50);
    window.record_error(NOW_MS - 20_000);

    let snapshot = window.snapshot(NOW_MS, 0);
    assert_eq!(snapshot.error_rate, 1.0 / 5.0);
    assert_eq!(snapshot.last_minute.failure, 2);
}

#[test]
fn test_marks_older_than_a_minute_are_pruned() {
    let mut window = MetricsWindow::new();
    window.record_request(NOW_MS - 90_000);
    window.record_request(NOW_MS - 61_000);
    window.record_request(NOW_MS - 30_000);
    window.record_error(NOW_MS - 75_000);

    let snapshot = window.snapshot(NOW_MS, 0);
    assert_eq!(snapshot.last_minute.total, 1);
    assert_eq!(snapshot.last_minute.failure, 0);
}

#[test]
fn test_last_minute_success_is_total_minus_failures() {
    let mut window = MetricsWindow::new();
    for i in 0..8 {
        window.record_request(NOW_MS - 100 * i);
    }
    for i in 0..3 {
        window.record_error(NOW_MS - 100 * i);
    }

    let snapshot = window.snapshot(NOW_MS, 0);
    assert_eq!(
        snapshot.last_minute,
        LastMinuteStats {
            total: 8,
            success: 5,
            failure: 3,
        }
    );
}

#[test]
fn test_average_over_response_samples() {
    let mut window = MetricsWindow::new();
    window.record_response_time(10.0);
    window.record_response_time(20.0);
    window.record_response_time(30.0);

    let snapshot = window.snapshot(NOW_MS, 0);
    assert_eq!(snapshot.average_response_time, 20.0);
}

/// Only the most recent 100 samples contribute to the average.
#[test]
fn test_response_ring_is_capped_at_one_hundred_samples() {
    let mut window = MetricsWindow::new();
    for sample in 0..150 {
        window.record_response_time(sample as f64);
    }

    // Last 100 samples are 50..=149, averaging 99.5
    let snapshot = window.snapshot(NOW_MS, 0);
    assert_eq!(snapshot.average_response_time, 99.5);
}

#[test]
fn test_current_load_is_passed_through() {
    let mut window = MetricsWindow::new();
    let snapshot = window.snapshot(NOW_MS, 7);
    assert_eq!(snapshot.current_load, 7);
}

#[test]
fn test_snapshot_serializes_with_camel_case_field_names() {
    let mut window = MetricsWindow::new();
    window.record_request(NOW_MS);
    let snapshot = window.snapshot(NOW_MS, 1);

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"requestRate\""));
    assert!(json.contains("\"averageResponseTime\""));
    assert!(json.contains("\"lastMinute\""));
}
