//! Tests for utility functions

use std::time::{Duration, UNIX_EPOCH};

use prometheus_task_loop::util::{init_tracing, now_ms, system_time_ms};

#[test]
fn test_now_ms_is_recent() {
    // 2020-01-01T00:00:00Z
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_system_time_ms() {
    assert_eq!(system_time_ms(UNIX_EPOCH + Duration::from_millis(1500)), 1500);
    assert_eq!(system_time_ms(UNIX_EPOCH - Duration::from_secs(1)), 0);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
