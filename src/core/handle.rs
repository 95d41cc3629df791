//! Schedule handles: the cancellation capability returned by every scheduling call.
//!
//! A [`ScheduleHandle`] tracks one activation of a unit of work on a thread pool.
//! It moves through the phases below and is shared between the caller and the
//! pool's timer and worker threads.
//!
//! ```text
//! Scheduled ──fire──▶ Running ──reschedule──▶ Scheduled
//!     │                  │
//!     │ cancel           ├──last run──▶ Completed
//!     ▼                  │
//! Cancelled ◀──return────┘ (cancel requested while running)
//! ```

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use super::SchedulerError;
use crate::util::clock::deadline_from;

/// Lifecycle phase of a scheduled activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlePhase {
    /// Waiting for its next firing time.
    Scheduled,
    /// An invocation is executing on a worker thread.
    Running,
    /// The activation ran to completion and will not fire again.
    Completed,
    /// The activation was cancelled or abandoned by a pool shutdown.
    Cancelled,
}

impl HandlePhase {
    /// Whether this phase is terminal.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

struct HandleInner {
    id: Uuid,
    label: String,
    phase: Mutex<HandlePhase>,
    changed: Condvar,
    cancel_requested: AtomicBool,
    interrupt_requested: AtomicBool,
    runs: AtomicU64,
}

/// Cancellation and completion token for one scheduled activation.
///
/// Cloning is cheap; every clone observes and controls the same activation.
#[derive(Clone)]
pub struct ScheduleHandle {
    inner: Arc<HandleInner>,
}

impl ScheduleHandle {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                label: label.into(),
                phase: Mutex::new(HandlePhase::Scheduled),
                changed: Condvar::new(),
                cancel_requested: AtomicBool::new(false),
                interrupt_requested: AtomicBool::new(false),
                runs: AtomicU64::new(0),
            }),
        }
    }

    /// Unique id of this activation.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Label of the scheduled work.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> HandlePhase {
        *self.inner.phase.lock()
    }

    /// True once the activation completed or was cancelled and no invocation is
    /// still executing.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase().is_finished()
    }

    /// True if cancellation was requested, even if an invocation is still running.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::Acquire)
    }

    /// True if interruption of the running invocation was requested.
    #[must_use]
    pub fn is_interrupt_requested(&self) -> bool {
        self.inner.interrupt_requested.load(Ordering::Acquire)
    }

    /// Number of invocations that have started.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::Relaxed)
    }

    /// Request a graceful stop: no further firings, a running invocation is left
    /// to finish.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyFinished` if the activation already
    /// completed or was cancelled.
    pub fn cancel(&self) -> Result<(), SchedulerError> {
        self.request_cancel(false)
    }

    /// Request a forceful stop: no further firings, and the running invocation
    /// (if any) is asked to return early through [`interrupted`].
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyFinished` if the activation already
    /// completed or was cancelled.
    pub fn interrupt(&self) -> Result<(), SchedulerError> {
        self.request_cancel(true)
    }

    fn request_cancel(&self, interrupt: bool) -> Result<(), SchedulerError> {
        let mut phase = self.inner.phase.lock();
        if phase.is_finished() {
            return Err(SchedulerError::AlreadyFinished(self.inner.id.to_string()));
        }
        self.inner.cancel_requested.store(true, Ordering::Release);
        if interrupt {
            self.inner.interrupt_requested.store(true, Ordering::Release);
        }
        // A running invocation moves the handle to Cancelled when it returns.
        if *phase == HandlePhase::Scheduled {
            *phase = HandlePhase::Cancelled;
            self.inner.changed.notify_all();
        }
        Ok(())
    }

    /// Block until the activation finishes or the timeout elapses.
    ///
    /// Returns `true` if the activation finished.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = deadline_from(Instant::now(), timeout);
        let mut phase = self.inner.phase.lock();
        while !phase.is_finished() {
            if self.inner.changed.wait_until(&mut phase, deadline).timed_out() {
                return phase.is_finished();
            }
        }
        true
    }

    /// Move to `Running` unless cancellation won the race.
    pub(crate) fn begin_run(&self) -> bool {
        let mut phase = self.inner.phase.lock();
        if *phase != HandlePhase::Scheduled || self.is_cancelled() {
            return false;
        }
        *phase = HandlePhase::Running;
        self.inner.runs.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Leave `Running`. Returns `true` if the activation should fire again.
    pub(crate) fn end_run(&self, reschedule: bool) -> bool {
        let mut phase = self.inner.phase.lock();
        let next = if self.is_cancelled() {
            HandlePhase::Cancelled
        } else if reschedule {
            HandlePhase::Scheduled
        } else {
            HandlePhase::Completed
        };
        *phase = next;
        if next.is_finished() {
            self.inner.changed.notify_all();
        }
        next == HandlePhase::Scheduled
    }

    /// Cancel on behalf of the pool (shutdown). Returns `false` if already finished.
    pub(crate) fn abandon(&self, interrupt: bool) -> bool {
        self.request_cancel(interrupt).is_ok()
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("phase", &self.phase())
            .field("runs", &self.run_count())
            .finish()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<ScheduleHandle>> = const { RefCell::new(None) };
}

/// Marks the handle whose invocation is executing on this thread.
pub(crate) struct CurrentGuard {
    previous: Option<ScheduleHandle>,
}

impl CurrentGuard {
    pub(crate) fn enter(handle: &ScheduleHandle) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(handle.clone())));
        Self { previous }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}

/// Whether the invocation running on the current thread has been asked to stop
/// via [`ScheduleHandle::interrupt`].
///
/// Long-running work should poll this and return early. Outside of a pool
/// invocation it always returns `false`.
#[must_use]
pub fn interrupted() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(ScheduleHandle::is_interrupt_requested)
    })
}
