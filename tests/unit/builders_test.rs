//! Tests for builder modules

use std::sync::Arc;

use prometheus_task_loop::builders::{build_pools, build_tasks, PoolBuilder};
use prometheus_task_loop::config::{LoopConfig, ThreadPoolConfig};
use prometheus_task_loop::core::{
    work, NamedInstanceRegistry, Repetition, SchedulerError, ThreadPool,
};

fn sample_config() -> LoopConfig {
    LoopConfig::from_json_str(
        r#"{
            "pools": { "p1": { "max_threads": 2 }, "p2": {} },
            "tasks": [
                { "name": "monitor", "pool_name": "p1", "repetition": "periodic", "interval_secs": 5 },
                { "name": "cleanup", "pool_name": "p2" }
            ]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_pool_builder_defaults() {
    let builder = PoolBuilder::new("pool1", ThreadPoolConfig::new().with_max_threads(3));
    assert_eq!(builder.name(), "pool1");
    assert_eq!(builder.config().max_threads, 3);
}

#[test]
fn test_build_pools_registers_each_pool() {
    let registry = NamedInstanceRegistry::new();
    let pools = build_pools(&sample_config(), &registry).unwrap();
    assert_eq!(pools.len(), 2);

    let p1 = registry.get::<ThreadPool>("p1").unwrap();
    assert_eq!(p1.max_threads(), 2);
    assert_eq!(p1.config().thread_name_prefix, "p1");
    assert!(Arc::ptr_eq(&pools[0], &p1));
}

#[test]
fn test_build_pools_conflict() {
    let registry = NamedInstanceRegistry::new();
    registry.get_or_default::<ThreadPool>("p1");
    let err = build_pools(&sample_config(), &registry).unwrap_err();
    assert!(matches!(err, SchedulerError::AlreadyExists { ref name, .. } if name == "p1"));
}

#[test]
fn test_build_tasks_from_config() {
    let registry = Arc::new(NamedInstanceRegistry::new());
    let tasks = build_tasks(&sample_config(), &registry, |_| Ok(work::from_fn(|| {}))).unwrap();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].name(), "monitor");
    assert_eq!(tasks[0].repetition(), Repetition::Periodic);
    assert_eq!(tasks[1].pool_name(), "p2");
    assert!(tasks.iter().all(|task| !task.is_running()));
}

#[test]
fn test_build_tasks_factory_error_propagates() {
    let registry = Arc::new(NamedInstanceRegistry::new());
    let result = build_tasks(&sample_config(), &registry, |task| {
        if task.name == "cleanup" {
            Err(SchedulerError::InvalidConfig("no work for cleanup".into()))
        } else {
            Ok(work::from_fn(|| {}))
        }
    });
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}
