//! Scheduling primitives: thread pools, schedule handles, scheduled tasks and
//! the named-instance registry that ties tasks to their pools.

pub mod error;
pub mod handle;
pub mod registry;
pub mod task;
pub mod thread_pool;
pub mod work;

pub use error::{AppResult, SchedulerError};
pub use handle::{interrupted, HandlePhase, ScheduleHandle};
pub use registry::NamedInstanceRegistry;
pub use task::{current_task_name, PoolFactory, Repetition, ScheduledTask};
pub use thread_pool::{AbandonedWork, PoolError, PoolStats, ThreadPool};
pub use work::{FnWork, Work};
