//! Thread pool and task configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::Repetition;

/// Environment variable overriding the worker count in [`ThreadPoolConfig::from_env`].
pub const MAX_THREADS_ENV: &str = "TASK_LOOP_MAX_THREADS";
/// Environment variable overriding the thread name prefix in [`ThreadPoolConfig::from_env`].
pub const THREAD_PREFIX_ENV: &str = "TASK_LOOP_THREAD_PREFIX";
/// Pool name used by tasks that do not name one.
pub const DEFAULT_POOL_NAME: &str = "default";

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

fn default_max_threads() -> usize {
    1
}

fn default_thread_name_prefix() -> String {
    "task-loop".into()
}

const fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

fn default_pool_name() -> String {
    DEFAULT_POOL_NAME.into()
}

/// Thread pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Number of worker threads; fixed for the life of the pool.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Prefix for worker and timer thread names, also used as the pool name in logs.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Stack size in bytes for pool threads.
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            thread_name_prefix: default_thread_name_prefix(),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl ThreadPoolConfig {
    /// Single worker thread with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One worker thread per logical CPU.
    #[must_use]
    pub fn per_cpu() -> Self {
        Self::new().with_max_threads(num_cpus::get())
    }

    /// Defaults overridden by `TASK_LOOP_MAX_THREADS` and `TASK_LOOP_THREAD_PREFIX`,
    /// reading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `TASK_LOOP_MAX_THREADS` is not a positive integer.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine; the process environment still applies.
        let _ = dotenvy::dotenv();

        let mut cfg = Self::new();
        if let Ok(raw) = std::env::var(MAX_THREADS_ENV) {
            cfg.max_threads = raw
                .trim()
                .parse()
                .map_err(|e| format!("{MAX_THREADS_ENV}=`{raw}`: {e}"))?;
        }
        if let Ok(prefix) = std::env::var(THREAD_PREFIX_ENV) {
            cfg.thread_name_prefix = prefix;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the stack size of pool threads.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("max_threads must be greater than 0".into());
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.stack_size < 64 * 1024 {
            return Err("stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Declarative description of a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name used in logs and thread labels.
    pub name: String,
    /// Name of the thread pool the task runs on.
    #[serde(default = "default_pool_name")]
    pub pool_name: String,
    /// Repetition policy; unrecognised values fall back to `once`.
    #[serde(default)]
    pub repetition: Repetition,
    /// Delay before the first invocation, in seconds.
    #[serde(default)]
    pub initial_delay_secs: u64,
    /// Interval between invocations, in seconds; ignored for `once`.
    #[serde(default)]
    pub interval_secs: u64,
}

impl TaskConfig {
    /// A run-once task on the default pool with no delay.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool_name: default_pool_name(),
            repetition: Repetition::Once,
            initial_delay_secs: 0,
            interval_secs: 0,
        }
    }

    /// Delay before the first invocation.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Interval between invocations.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate task configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("task name must not be empty".into());
        }
        if self.pool_name.trim().is_empty() {
            return Err(format!("task `{}`: pool_name must not be empty", self.name));
        }
        if self.repetition.is_repeating() && self.interval_secs == 0 {
            return Err(format!(
                "task `{}`: interval_secs must be greater than 0 for {} tasks",
                self.name, self.repetition
            ));
        }
        Ok(())
    }
}

/// Root configuration: named pools and the tasks that run on them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Map of pool name to configuration.
    #[serde(default)]
    pub pools: HashMap<String, ThreadPoolConfig>,
    /// Tasks to build.
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl LoopConfig {
    /// Validate all pools and tasks.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid pool or task.
    pub fn validate(&self) -> Result<(), String> {
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is invalid.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are invalid.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_json_str(&input)
    }
}
