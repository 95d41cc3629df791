//! Tests for configuration modules

use prometheus_task_loop::config::{LoopConfig, ThreadPoolConfig, DEFAULT_POOL_NAME};
use prometheus_task_loop::core::Repetition;

#[test]
fn test_loop_config_from_json() {
    let json = r#"{
        "pools": {
            "p1": { "max_threads": 2 },
            "io": { "max_threads": 4, "thread_name_prefix": "io" }
        },
        "tasks": [
            { "name": "monitor", "pool_name": "p1", "repetition": "periodic", "initial_delay_secs": 1, "interval_secs": 5 },
            { "name": "report", "pool_name": "p1", "repetition": "sequential", "interval_secs": 30 },
            { "name": "reminder", "initial_delay_secs": 10 }
        ]
    }"#;

    let cfg = LoopConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pools.len(), 2);
    assert_eq!(cfg.pools["p1"].max_threads, 2);
    assert_eq!(cfg.pools["p1"].thread_name_prefix, ThreadPoolConfig::default().thread_name_prefix);
    assert_eq!(cfg.tasks[0].repetition, Repetition::Periodic);
    assert_eq!(cfg.tasks[1].repetition, Repetition::Sequential);
    assert_eq!(cfg.tasks[2].repetition, Repetition::Once);
    assert_eq!(cfg.tasks[2].pool_name, DEFAULT_POOL_NAME);
}

#[test]
fn test_unknown_repetition_runs_once() {
    let json = r#"{ "tasks": [ { "name": "odd", "repetition": "fortnightly" } ] }"#;
    let cfg = LoopConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.tasks[0].repetition, Repetition::Once);
}

#[test]
fn test_invalid_pool_rejected() {
    let json = r#"{ "pools": { "p1": { "max_threads": 0 } } }"#;
    let err = LoopConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("pool `p1` invalid"));
}

#[test]
fn test_periodic_without_interval_rejected() {
    let json = r#"{ "tasks": [ { "name": "tick", "repetition": "periodic" } ] }"#;
    assert!(LoopConfig::from_json_str(json).is_err());
}

#[test]
fn test_malformed_json_rejected() {
    let err = LoopConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_thread_pool_config_builders() {
    let cfg = ThreadPoolConfig::new()
        .with_max_threads(8)
        .with_thread_name_prefix("batch")
        .with_stack_size(512 * 1024);
    assert_eq!(cfg.max_threads, 8);
    assert_eq!(cfg.thread_name_prefix, "batch");
    assert!(cfg.validate().is_ok());
}
