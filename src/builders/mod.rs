//! Builders to construct pools and tasks from configuration.

pub mod pool_builder;
pub mod task_builder;

pub use pool_builder::{build_pools, PoolBuilder};
pub use task_builder::build_tasks;
