//! Configuration models for thread pools and scheduled tasks.

pub mod pool;

pub use pool::{
    LoopConfig, TaskConfig, ThreadPoolConfig, DEFAULT_POOL_NAME, MAX_THREADS_ENV,
    THREAD_PREFIX_ENV,
};
