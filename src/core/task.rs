//! Self-scheduling tasks.
//!
//! A [`ScheduledTask`] pairs a unit of work with a name, a pool name and a
//! repetition policy. [`ScheduledTask::start`] resolves the named
//! [`ThreadPool`] through a [`NamedInstanceRegistry`] and dispatches the work
//! with the primitive matching the policy:
//!
//! | Repetition   | Primitive                           | Next start measured from |
//! |--------------|-------------------------------------|--------------------------|
//! | `Once`       | [`ThreadPool::schedule_once`]       | n/a                      |
//! | `Periodic`   | [`ThreadPool::schedule_periodic`]   | previous start           |
//! | `Sequential` | [`ThreadPool::schedule_sequential`] | previous end             |
//!
//! A task has at most one live activation. Starting a task that is still
//! scheduled or running is refused, and `start`/`stop` on the same task are
//! serialized by a per-task lock.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_task_loop::core::{work, NamedInstanceRegistry, Repetition, ScheduledTask};
//!
//! let registry = Arc::new(NamedInstanceRegistry::new());
//! let task = ScheduledTask::new("monitor", work::from_fn(|| tracing::info!("tick")), registry)
//!     .with_pool_name("p1")
//!     .with_repetition(Repetition::Periodic)
//!     .with_initial_delay(Duration::from_secs(1))
//!     .with_interval(Duration::from_secs(5));
//!
//! assert!(task.start());
//! std::thread::sleep(Duration::from_secs(20));
//! task.stop(false);
//! ```

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use crate::config::{TaskConfig, DEFAULT_POOL_NAME};
use crate::util::clock::system_time_ms;

use super::{AppResult, NamedInstanceRegistry, ScheduleHandle, SchedulerError, ThreadPool, Work};

/// How a task repeats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Repetition {
    /// Run a single time after the initial delay.
    #[default]
    Once,
    /// Fixed rate: starts are spaced by the interval, measured from the previous
    /// start. An overrunning invocation delays the next one instead of overlapping.
    Periodic,
    /// Fixed delay: each start is the interval after the previous invocation ended.
    Sequential,
}

impl Repetition {
    /// Whether the policy fires more than once.
    #[must_use]
    pub const fn is_repeating(self) -> bool {
        !matches!(self, Self::Once)
    }

    /// Lowercase name as used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Periodic => "periodic",
            Self::Sequential => "sequential",
        }
    }
}

impl fmt::Display for Repetition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Repetition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(Self::Once),
            "periodic" | "fixed_rate" => Ok(Self::Periodic),
            "sequential" | "fixed_delay" => Ok(Self::Sequential),
            other => Err(format!("unknown repetition `{other}`")),
        }
    }
}

impl From<String> for Repetition {
    /// Lenient conversion used by configuration: unknown names run once.
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to `once` repetition");
            Self::Once
        })
    }
}

/// Constructor for the pool a task runs on when the pool is not registered yet.
pub type PoolFactory = Arc<dyn Fn() -> AppResult<ThreadPool> + Send + Sync>;

thread_local! {
    static CURRENT_TASK: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Name of the task whose invocation is running on the current thread.
#[must_use]
pub fn current_task_name() -> Option<String> {
    CURRENT_TASK.with(|current| current.borrow().clone())
}

/// Restores the previous task label on drop, including when the work unwinds.
struct TaskLabelGuard {
    previous: Option<String>,
}

impl TaskLabelGuard {
    fn enter(name: &str) -> Self {
        let previous = CURRENT_TASK.with(|current| current.replace(Some(name.to_owned())));
        Self { previous }
    }
}

impl Drop for TaskLabelGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TASK.with(|current| *current.borrow_mut() = previous);
    }
}

/// The work a task hands to its pool: labels the thread, runs the user work and
/// records the completion time.
struct TaskRun {
    name: Arc<str>,
    work: Arc<dyn Work>,
    last_run: Arc<Mutex<Option<SystemTime>>>,
}

impl Work for TaskRun {
    fn run(&self) -> AppResult<()> {
        let _span = info_span!("task", name = %self.name).entered();
        let result = {
            let _label = TaskLabelGuard::enter(&self.name);
            self.work.run()
        };
        *self.last_run.lock() = Some(SystemTime::now());
        result
    }

    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }
}

/// A named unit of work with a repetition policy, started on a named thread pool.
pub struct ScheduledTask {
    name: String,
    pool_name: String,
    repetition: Repetition,
    initial_delay: Duration,
    interval: Duration,
    work: Arc<dyn Work>,
    registry: Arc<NamedInstanceRegistry>,
    pool_factory: Option<PoolFactory>,
    last_run: Arc<Mutex<Option<SystemTime>>>,
    /// Guards start/stop; holds the live activation.
    handle: Mutex<Option<ScheduleHandle>>,
}

impl ScheduledTask {
    /// Create a run-once task with no delay on the default pool.
    pub fn new<W: Work>(
        name: impl Into<String>,
        work: W,
        registry: Arc<NamedInstanceRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            pool_name: DEFAULT_POOL_NAME.to_owned(),
            repetition: Repetition::Once,
            initial_delay: Duration::ZERO,
            interval: Duration::ZERO,
            work: Arc::new(work),
            registry,
            pool_factory: None,
            last_run: Arc::new(Mutex::new(None)),
            handle: Mutex::new(None),
        }
    }

    /// Run `work` once after `delay` on the default pool, under the name `delay`.
    pub fn deferred<W: Work>(
        work: W,
        delay: Duration,
        registry: Arc<NamedInstanceRegistry>,
    ) -> Self {
        Self::new("delay", work, registry).with_initial_delay(delay)
    }

    /// Build a task from its declarative configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn from_config<W: Work>(
        config: &TaskConfig,
        work: W,
        registry: Arc<NamedInstanceRegistry>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(Self::new(config.name.clone(), work, registry)
            .with_pool_name(config.pool_name.clone())
            .with_repetition(config.repetition)
            .with_initial_delay(config.initial_delay())
            .with_interval(config.interval()))
    }

    /// Set the pool name.
    #[must_use]
    pub fn with_pool_name(mut self, pool_name: impl Into<String>) -> Self {
        self.pool_name = pool_name.into();
        self
    }

    /// Set the repetition policy.
    #[must_use]
    pub const fn with_repetition(mut self, repetition: Repetition) -> Self {
        self.repetition = repetition;
        self
    }

    /// Set the delay before the first invocation.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the interval between invocations.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the constructor used when the named pool is not registered yet.
    #[must_use]
    pub fn with_pool_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> AppResult<ThreadPool> + Send + Sync + 'static,
    {
        self.pool_factory = Some(Arc::new(factory));
        self
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the task. Takes effect on the next start.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Name of the pool the task runs on.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    /// Change the pool. Takes effect on the next start.
    pub fn set_pool_name(&mut self, pool_name: impl Into<String>) {
        self.pool_name = pool_name.into();
    }

    /// Repetition policy.
    #[must_use]
    pub const fn repetition(&self) -> Repetition {
        self.repetition
    }

    /// Change the repetition policy. Takes effect on the next start.
    pub const fn set_repetition(&mut self, repetition: Repetition) {
        self.repetition = repetition;
    }

    /// Delay before the first invocation.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Change the initial delay. Takes effect on the next start.
    pub const fn set_initial_delay(&mut self, delay: Duration) {
        self.initial_delay = delay;
    }

    /// Interval between invocations; unused for `Once`.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the interval. Takes effect on the next start.
    pub const fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// When the most recent invocation finished.
    #[must_use]
    pub fn last_run(&self) -> Option<SystemTime> {
        *self.last_run.lock()
    }

    /// Handle of the current or most recent activation.
    #[must_use]
    pub fn handle(&self) -> Option<ScheduleHandle> {
        self.handle.lock().clone()
    }

    /// Whether an activation is scheduled or an invocation is still executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Schedule the task on its pool.
    ///
    /// Returns `false` if the task is already running or scheduling failed; the
    /// reason is logged.
    pub fn start(&self) -> bool {
        match self.try_start() {
            Ok(_) => true,
            Err(SchedulerError::AlreadyRunning(_)) => {
                warn!(task = %self.name, "Start requested for a task that is already running; ignoring");
                false
            }
            Err(e) => {
                error!(task = %self.name, error = %e, "Failed to schedule task");
                false
            }
        }
    }

    /// Schedule the task on its pool, returning the new activation's handle.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::AlreadyRunning` if the previous activation is live
    /// - `SchedulerError::Creation` if the pool factory failed
    /// - `SchedulerError::Pool` if the pool rejected the work
    pub fn try_start(&self) -> Result<ScheduleHandle, SchedulerError> {
        let mut slot = self.handle.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning(self.name.clone()));
        }

        let pool = self.resolve_pool()?;
        info!(task = %self.name, pool = %self.pool_name, "Scheduling task");

        let run = TaskRun {
            name: Arc::from(self.name.as_str()),
            work: Arc::clone(&self.work),
            last_run: Arc::clone(&self.last_run),
        };
        let handle = match self.repetition {
            Repetition::Once => pool.schedule_once(run, self.initial_delay)?,
            Repetition::Periodic => {
                pool.schedule_periodic(run, self.initial_delay, self.interval)?
            }
            Repetition::Sequential => {
                pool.schedule_sequential(run, self.initial_delay, self.interval)?
            }
        };
        *slot = Some(handle.clone());

        info!(
            task = %self.name,
            pool = %self.pool_name,
            repetition = %self.repetition,
            initial_delay_ms = duration_ms(self.initial_delay),
            interval_ms = duration_ms(self.interval),
            last_run_ms = self.last_run().map(system_time_ms),
            handle = %handle.id(),
            "Task scheduled"
        );
        Ok(handle)
    }

    fn resolve_pool(&self) -> Result<Arc<ThreadPool>, SchedulerError> {
        let pool_name = self.pool_name.clone();
        self.registry
            .get_or_try_create(&self.pool_name, || match &self.pool_factory {
                Some(factory) => factory(),
                None => Ok(ThreadPool::new(
                    crate::config::ThreadPoolConfig::new().with_thread_name_prefix(pool_name),
                )?),
            })
    }

    /// Cancel the current activation. With `forceful` the running invocation is
    /// also asked to stop. Problems are logged, never returned.
    pub fn stop(&self, forceful: bool) {
        match self.try_stop(forceful) {
            Ok(()) => {}
            Err(SchedulerError::NotScheduled(_)) => {
                info!(task = %self.name, "Stop requested for a task that was never started");
            }
            Err(e) => {
                error!(task = %self.name, error = %e, "Failed to stop task");
            }
        }
    }

    /// Cancel the current activation.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::NotScheduled` if the task was never started
    /// - `SchedulerError::AlreadyFinished` if the activation already ended
    pub fn try_stop(&self, forceful: bool) -> Result<(), SchedulerError> {
        let slot = self.handle.lock();
        let handle = slot
            .as_ref()
            .ok_or_else(|| SchedulerError::NotScheduled(self.name.clone()))?;
        if forceful {
            handle.interrupt()?;
        } else {
            handle.cancel()?;
        }
        info!(task = %self.name, forceful = forceful, handle = %handle.id(), "Task stopped");
        Ok(())
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("pool_name", &self.pool_name)
            .field("repetition", &self.repetition)
            .field("initial_delay", &self.initial_delay)
            .field("interval", &self.interval)
            .field("last_run", &self.last_run())
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
