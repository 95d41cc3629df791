//! Named thread pool with delayed, fixed-rate and fixed-delay dispatch.
//!
//! A [`ThreadPool`] owns `max_threads` dedicated OS worker threads plus one
//! timer thread. The timer keeps every pending activation in a deadline-ordered
//! heap and hands due activations to the workers over a channel. Repeating
//! activations are re-inserted by the worker that ran them, so one activation is
//! never queued or executing twice at the same time.
//!
//! The worker and timer threads are started lazily on the first scheduling
//! call and are never replaced afterwards; shutdown is terminal.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use prometheus_task_loop::config::ThreadPoolConfig;
//! use prometheus_task_loop::core::{work, ThreadPool};
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::new().with_max_threads(2))?;
//!
//! let handle = pool.schedule_periodic(
//!     work::from_fn(|| tracing::info!("tick")),
//!     Duration::from_secs(1),
//!     Duration::from_secs(5),
//! )?;
//!
//! handle.cancel()?;
//! pool.shutdown(false);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod native;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ThreadPoolConfig;
use crate::core::handle::ScheduleHandle;
use crate::core::work::Work;

use native::{Cadence, Scheduler};

/// Errors that can occur when using a [`ThreadPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been shut down and rejects new work.
    #[error("thread pool `{0}` has been shut down")]
    Shutdown(String),
    /// A repeating schedule was requested with a zero interval.
    #[error("interval must be greater than zero for {0} scheduling")]
    InvalidInterval(&'static str),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker or timer thread could not be spawned.
    #[error("failed to spawn pool thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of worker threads.
    pub max_threads: usize,
    /// Activations waiting for their next firing time.
    pub pending: u64,
    /// Invocations executing right now.
    pub active: u64,
    /// Activations accepted since the pool started.
    pub submitted: u64,
    /// Invocations that returned `Ok`.
    pub completed_runs: u64,
    /// Invocations that returned an error or panicked.
    pub failed_runs: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub pending: AtomicU64,
    pub active: AtomicU64,
    pub submitted: AtomicU64,
    pub completed_runs: AtomicU64,
    pub failed_runs: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, max_threads: usize) -> PoolStats {
        PoolStats {
            max_threads,
            pending: self.pending.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed_runs: self.completed_runs.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
        }
    }
}

/// Work discarded by a forceful shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedWork {
    /// Id of the abandoned activation.
    pub id: Uuid,
    /// Label of the abandoned work.
    pub label: String,
    /// Whether the work was executing (and has been asked to stop) rather than
    /// waiting for its next firing.
    pub was_running: bool,
}

/// Named pool of worker threads with a lazily started scheduling facility.
pub struct ThreadPool {
    config: ThreadPoolConfig,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
    shut_down: Mutex<bool>,
    counters: Arc<PoolCounters>,
}

impl ThreadPool {
    /// Create a pool. No threads are started until the first scheduling call.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if `max_threads` is zero.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        Ok(Self {
            config,
            scheduler: Mutex::new(None),
            shut_down: Mutex::new(false),
            counters: Arc::new(PoolCounters::default()),
        })
    }

    /// Create a pool with `threads` workers and default settings otherwise.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if `threads` is zero.
    pub fn with_threads(threads: usize) -> Result<Self, PoolError> {
        Self::new(ThreadPoolConfig::new().with_max_threads(threads))
    }

    /// Maximum number of worker threads.
    #[must_use]
    pub const fn max_threads(&self) -> usize {
        self.config.max_threads
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Run `work` once after `delay`.
    ///
    /// # Errors
    ///
    /// - `PoolError::Shutdown` if the pool has been shut down
    /// - `PoolError::Spawn` if the pool threads could not be started
    pub fn schedule_once<W: Work>(
        &self,
        work: W,
        delay: Duration,
    ) -> Result<ScheduleHandle, PoolError> {
        self.submit(Arc::new(work), delay, Cadence::Once)
    }

    /// Run `work` repeatedly at a fixed rate: each start is `interval` after the
    /// previous scheduled start. An invocation that overruns pushes the next one
    /// to the moment it returns; missed ticks are not replayed.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidInterval` if `interval` is zero
    /// - `PoolError::Shutdown` if the pool has been shut down
    /// - `PoolError::Spawn` if the pool threads could not be started
    pub fn schedule_periodic<W: Work>(
        &self,
        work: W,
        initial_delay: Duration,
        interval: Duration,
    ) -> Result<ScheduleHandle, PoolError> {
        if interval.is_zero() {
            return Err(PoolError::InvalidInterval("periodic"));
        }
        self.submit(Arc::new(work), initial_delay, Cadence::FixedRate(interval))
    }

    /// Run `work` repeatedly with a fixed delay: each start is `interval` after
    /// the previous invocation returned.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidInterval` if `interval` is zero
    /// - `PoolError::Shutdown` if the pool has been shut down
    /// - `PoolError::Spawn` if the pool threads could not be started
    pub fn schedule_sequential<W: Work>(
        &self,
        work: W,
        initial_delay: Duration,
        interval: Duration,
    ) -> Result<ScheduleHandle, PoolError> {
        if interval.is_zero() {
            return Err(PoolError::InvalidInterval("sequential"));
        }
        self.submit(Arc::new(work), initial_delay, Cadence::FixedDelay(interval))
    }

    fn submit(
        &self,
        work: Arc<dyn Work>,
        delay: Duration,
        cadence: Cadence,
    ) -> Result<ScheduleHandle, PoolError> {
        self.scheduler()?.submit(work, delay, cadence)
    }

    /// Return the scheduling facility, starting it on first use.
    fn scheduler(&self) -> Result<Arc<Scheduler>, PoolError> {
        let shut_down = self.shut_down.lock();
        if *shut_down {
            return Err(PoolError::Shutdown(self.config.thread_name_prefix.clone()));
        }
        let mut slot = self.scheduler.lock();
        if let Some(scheduler) = slot.as_ref() {
            return Ok(Arc::clone(scheduler));
        }
        let scheduler = Arc::new(Scheduler::start(&self.config, Arc::clone(&self.counters))?);
        *slot = Some(Arc::clone(&scheduler));
        Ok(scheduler)
    }

    /// Shut the pool down.
    ///
    /// With `forceful = false` the pool stops accepting work, repeating
    /// activations are not rescheduled, and pending one-shot work and running
    /// invocations are allowed to finish. With `forceful = true` every pending
    /// activation is discarded and running invocations are asked to stop; each
    /// abandoned unit is logged and returned.
    ///
    /// Calling this more than once is harmless; later calls only escalate a
    /// graceful shutdown to a forceful one.
    pub fn shutdown(&self, forceful: bool) -> Vec<AbandonedWork> {
        let mut shut_down = self.shut_down.lock();
        let first = !*shut_down;
        *shut_down = true;
        drop(shut_down);

        let scheduler = self.scheduler.lock().clone();
        let Some(scheduler) = scheduler else {
            if first {
                info!(pool = %self.config.thread_name_prefix, "Thread pool shut down before first use");
            }
            return Vec::new();
        };

        if first {
            info!(
                pool = %self.config.thread_name_prefix,
                forceful = forceful,
                "Shutting down thread pool"
            );
        }

        let abandoned = scheduler.shutdown(forceful);
        for unit in &abandoned {
            warn!(
                pool = %self.config.thread_name_prefix,
                id = %unit.id,
                label = %unit.label,
                was_running = unit.was_running,
                "Work interrupted by shutdown"
            );
        }
        abandoned
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shut_down.lock()
    }

    /// Whether the pool is shut down and all of its threads have stopped work.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        if !self.is_shutdown() {
            return false;
        }
        self.scheduler
            .lock()
            .as_ref()
            .is_none_or(|scheduler| scheduler.is_terminated())
    }

    /// Block until the pool terminates after shutdown, joining its threads.
    ///
    /// Returns `false` if the pool was not shut down or the timeout elapsed first.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        if !self.is_shutdown() {
            return false;
        }
        let scheduler = self.scheduler.lock().clone();
        scheduler.is_none_or(|scheduler| scheduler.await_termination(timeout))
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.max_threads)
    }
}

impl Default for ThreadPool {
    /// Single worker thread with default settings.
    fn default() -> Self {
        Self {
            config: ThreadPoolConfig::default(),
            scheduler: Mutex::new(None),
            shut_down: Mutex::new(false),
            counters: Arc::new(PoolCounters::default()),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join: threads exit once pending work drains.
        if let Some(scheduler) = self.scheduler.get_mut().take() {
            if !*self.shut_down.get_mut() {
                scheduler.shutdown(false);
            }
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("config", &self.config)
            .field("started", &self.scheduler.lock().is_some())
            .field("shut_down", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
