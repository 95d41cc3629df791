//! Tests for error types

use prometheus_task_loop::core::{PoolError, SchedulerError};

#[test]
fn test_already_running_error() {
    let err = SchedulerError::AlreadyRunning("monitor".to_string());
    assert_eq!(format!("{}", err), "task `monitor` is already scheduled");
}

#[test]
fn test_not_scheduled_error() {
    let err = SchedulerError::NotScheduled("monitor".to_string());
    assert_eq!(format!("{}", err), "task `monitor` has no schedule handle");
}

#[test]
fn test_already_exists_error() {
    let err = SchedulerError::AlreadyExists {
        name: "p1".to_string(),
        type_name: "ThreadPool",
    };
    assert_eq!(format!("{}", err), "instance `p1` already exists for type `ThreadPool`");
}

#[test]
fn test_creation_error_keeps_source() {
    let err = SchedulerError::Creation {
        name: "p1".to_string(),
        type_name: "ThreadPool",
        source: anyhow::anyhow!("out of threads"),
    };
    assert!(format!("{}", err).ends_with("out of threads"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_pool_error_is_transparent() {
    let err: SchedulerError = PoolError::Shutdown("p1".to_string()).into();
    assert_eq!(format!("{}", err), "thread pool `p1` has been shut down");
}
