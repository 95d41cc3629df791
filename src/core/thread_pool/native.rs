//! Native scheduling facility: one timer thread feeding dedicated worker threads.
//!
//! # Design
//!
//! - **No polling**: the timer sleeps on a Condvar until the earliest deadline or
//!   a new submission; workers block on channel recv.
//! - **One copy per activation**: an activation lives either in the timer heap or
//!   with exactly one worker, never both, so a repeating task cannot overlap itself.
//! - **Clean shutdown**: the timer exits once nothing is pending or in flight and
//!   drops the sender, which unblocks and ends every worker.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::ThreadPoolConfig;
use crate::util::clock::deadline_from;
use crate::core::handle::{CurrentGuard, HandlePhase, ScheduleHandle};
use crate::core::work::Work;

use super::{AbandonedWork, PoolCounters, PoolError};

/// How an activation picks its next firing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Cadence {
    /// Fire once.
    Once,
    /// Next start is the previous scheduled start plus the interval.
    FixedRate(Duration),
    /// Next start is the previous end plus the interval.
    FixedDelay(Duration),
}

impl Cadence {
    const fn is_repeating(self) -> bool {
        !matches!(self, Self::Once)
    }

    /// Next due time for an invocation that was due at `scheduled` and returned at `ended`.
    fn next_due(self, scheduled: Instant, ended: Instant) -> Option<Instant> {
        match self {
            Self::Once => None,
            Self::FixedRate(interval) => {
                let next = deadline_from(scheduled, interval);
                // Overran: start again right away instead of replaying missed ticks.
                Some(next.max(ended))
            }
            Self::FixedDelay(interval) => Some(deadline_from(ended, interval)),
        }
    }
}

/// One scheduled activation of a unit of work.
struct Activation {
    work: Arc<dyn Work>,
    handle: ScheduleHandle,
    cadence: Cadence,
    due: Instant,
}

/// Heap entry ordered so the earliest deadline (then the oldest submission) pops first.
struct Entry {
    seq: u64,
    activation: Activation,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.activation.due == other.activation.due
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .activation
            .due
            .cmp(&self.activation.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerState {
    queue: BinaryHeap<Entry>,
    /// Activations handed to workers and not yet returned, keyed by handle id.
    in_flight: HashMap<Uuid, ScheduleHandle>,
    accepting: bool,
    terminated: bool,
    next_seq: u64,
}

impl TimerState {
    fn push(&mut self, activation: Activation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry { seq, activation });
    }
}

struct Shared {
    name: String,
    state: Mutex<TimerState>,
    /// Wakes the timer: new submission, returned activation, or shutdown.
    wake: Condvar,
    /// Wakes `await_termination` callers.
    terminated: Condvar,
    counters: Arc<PoolCounters>,
}

/// Timer plus worker threads backing a started `ThreadPool`.
pub(super) struct Scheduler {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the worker threads and the timer thread.
    pub(super) fn start(
        config: &ThreadPoolConfig,
        counters: Arc<PoolCounters>,
    ) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            name: config.thread_name_prefix.clone(),
            state: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                in_flight: HashMap::new(),
                accepting: true,
                terminated: false,
                next_seq: 0,
            }),
            wake: Condvar::new(),
            terminated: Condvar::new(),
            counters,
        });

        let (task_tx, task_rx) = unbounded::<Activation>();
        let mut threads = Vec::with_capacity(config.max_threads + 1);

        // If a spawn fails, dropping task_tx on return stops the workers already started.
        for worker_id in 0..config.max_threads {
            threads.push(spawn_worker(
                worker_id,
                task_rx.clone(),
                Arc::clone(&shared),
                config,
            )?);
        }
        threads.push(spawn_timer(task_tx, Arc::clone(&shared), config)?);

        info!(
            pool = %config.thread_name_prefix,
            max_threads = config.max_threads,
            "Thread pool started"
        );

        Ok(Self {
            shared,
            threads: Mutex::new(threads),
        })
    }

    /// Queue a new activation.
    pub(super) fn submit(
        &self,
        work: Arc<dyn Work>,
        delay: Duration,
        cadence: Cadence,
    ) -> Result<ScheduleHandle, PoolError> {
        let handle = ScheduleHandle::new(work.label());

        let mut state = self.shared.state.lock();
        if !state.accepting {
            return Err(PoolError::Shutdown(self.shared.name.clone()));
        }
        let due = deadline_from(Instant::now(), delay);
        state.push(Activation {
            work,
            handle: handle.clone(),
            cadence,
            due,
        });
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.counters.pending.fetch_add(1, Ordering::Relaxed);
        drop(state);

        debug!(
            pool = %self.shared.name,
            id = %handle.id(),
            label = %handle.label(),
            ?cadence,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Work scheduled"
        );
        self.shared.wake.notify_one();
        Ok(handle)
    }

    /// Stop accepting work; see `ThreadPool::shutdown`.
    pub(super) fn shutdown(&self, forceful: bool) -> Vec<AbandonedWork> {
        let mut state = self.shared.state.lock();
        state.accepting = false;
        let mut abandoned = Vec::new();

        if forceful {
            for entry in state.queue.drain() {
                let handle = entry.activation.handle;
                if handle.abandon(false) {
                    abandoned.push(AbandonedWork {
                        id: handle.id(),
                        label: handle.label().to_owned(),
                        was_running: false,
                    });
                }
            }
            for handle in state.in_flight.values() {
                let was_running = handle.phase() == HandlePhase::Running;
                if handle.abandon(true) {
                    abandoned.push(AbandonedWork {
                        id: handle.id(),
                        label: handle.label().to_owned(),
                        was_running,
                    });
                }
            }
        } else {
            // Repeating activations stop here; pending one-shot work still runs.
            state.queue.retain(|entry| {
                let activation = &entry.activation;
                if activation.cadence.is_repeating() {
                    activation.handle.abandon(false);
                    false
                } else {
                    !activation.handle.is_finished()
                }
            });
        }

        self.shared
            .counters
            .pending
            .store(state.queue.len() as u64, Ordering::Relaxed);
        drop(state);
        self.shared.wake.notify_all();
        abandoned
    }

    pub(super) fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }

    /// Wait for the timer to finish, then join every pool thread.
    pub(super) fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = deadline_from(Instant::now(), timeout);
        {
            let mut state = self.shared.state.lock();
            while !state.terminated {
                if self
                    .shared
                    .terminated
                    .wait_until(&mut state, deadline)
                    .timed_out()
                {
                    if !state.terminated {
                        return false;
                    }
                    break;
                }
            }
        }

        let current = thread::current().id();
        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in threads {
            // A pool thread awaiting its own pool must not join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(pool = %self.shared.name, "Pool thread panicked");
            }
        }
        true
    }
}

fn spawn_timer(
    task_tx: Sender<Activation>,
    shared: Arc<Shared>,
    config: &ThreadPoolConfig,
) -> Result<JoinHandle<()>, PoolError> {
    let handle = thread::Builder::new()
        .name(format!("{}-timer", config.thread_name_prefix))
        .stack_size(config.stack_size)
        .spawn(move || run_timer(&task_tx, &shared))?;
    Ok(handle)
}

fn run_timer(task_tx: &Sender<Activation>, shared: &Shared) {
    debug!(pool = %shared.name, "Timer thread started");
    let mut state = shared.state.lock();

    loop {
        let next_due = state.queue.peek().map(|entry| entry.activation.due);
        match next_due {
            Some(due) if due <= Instant::now() => {
                let Some(entry) = state.queue.pop() else {
                    continue;
                };
                shared.counters.pending.fetch_sub(1, Ordering::Relaxed);
                let activation = entry.activation;
                // Cancelled while waiting.
                if activation.handle.is_finished() {
                    continue;
                }
                state
                    .in_flight
                    .insert(activation.handle.id(), activation.handle.clone());
                if task_tx.send(activation).is_err() {
                    error!(pool = %shared.name, "All workers exited; timer stopping");
                    break;
                }
            }
            Some(due) => {
                shared.wake.wait_until(&mut state, due);
            }
            None => {
                if !state.accepting && state.in_flight.is_empty() {
                    break;
                }
                shared.wake.wait(&mut state);
            }
        }
    }

    state.terminated = true;
    shared.terminated.notify_all();
    debug!(pool = %shared.name, "Timer thread exiting");
}

fn spawn_worker(
    worker_id: usize,
    task_rx: Receiver<Activation>,
    shared: Arc<Shared>,
    config: &ThreadPoolConfig,
) -> Result<JoinHandle<()>, PoolError> {
    let handle = thread::Builder::new()
        .name(format!("{}-worker-{worker_id}", config.thread_name_prefix))
        .stack_size(config.stack_size)
        .spawn(move || run_worker(worker_id, &task_rx, &shared))?;
    Ok(handle)
}

fn run_worker(worker_id: usize, task_rx: &Receiver<Activation>, shared: &Shared) {
    debug!(pool = %shared.name, worker_id = worker_id, "Worker thread started");

    // recv fails once the timer drops the sender.
    while let Ok(mut activation) = task_rx.recv() {
        let handle = activation.handle.clone();
        let started = handle.begin_run();

        if started {
            shared.counters.active.fetch_add(1, Ordering::Relaxed);
            let succeeded = invoke(&activation, &shared.name);
            shared.counters.active.fetch_sub(1, Ordering::Relaxed);
            let counter = if succeeded {
                &shared.counters.completed_runs
            } else {
                &shared.counters.failed_runs
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let mut state = shared.state.lock();
        state.in_flight.remove(&handle.id());
        if started {
            let next_due = if state.accepting {
                activation.cadence.next_due(activation.due, Instant::now())
            } else {
                None
            };
            if handle.end_run(next_due.is_some()) {
                if let Some(due) = next_due {
                    activation.due = due;
                    state.push(activation);
                    shared.counters.pending.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        drop(state);
        shared.wake.notify_one();
    }

    debug!(pool = %shared.name, worker_id = worker_id, "Worker thread exiting");
}

/// Run one invocation, containing errors and panics. Returns `true` on success.
fn invoke(activation: &Activation, pool: &str) -> bool {
    let _current = CurrentGuard::enter(&activation.handle);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| activation.work.run()));
    match outcome {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(
                pool = %pool,
                label = %activation.handle.label(),
                error = %e,
                "Work failed"
            );
            false
        }
        Err(payload) => {
            error!(
                pool = %pool,
                label = %activation.handle.label(),
                panic = %panic_message(payload.as_ref()),
                "Work panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
