//! Integration tests for ThreadPool
//!
//! These tests validate real-world functionality including:
//! - Delayed one-shot execution
//! - Fixed-rate and fixed-delay cadence, including overrunning work
//! - Non-overlap of a single activation
//! - Cancellation and cooperative interruption
//! - Graceful and forceful shutdown

use prometheus_task_loop::config::ThreadPoolConfig;
use prometheus_task_loop::core::{interrupted, work, HandlePhase, PoolError, ThreadPool};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn pool(threads: usize) -> ThreadPool {
    ThreadPool::new(
        ThreadPoolConfig::new()
            .with_max_threads(threads)
            .with_thread_name_prefix("test-pool"),
    )
    .unwrap()
}

/// Records the instant of every invocation start.
fn recorder() -> (Arc<Mutex<Vec<Instant>>>, impl Fn() + Send + Sync + 'static) {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&starts);
    (starts, move || sink.lock().push(Instant::now()))
}

fn gaps(starts: &[Instant]) -> Vec<Duration> {
    starts.windows(2).map(|w| w[1] - w[0]).collect()
}

// ============================================================================
// ONE-SHOT SCHEDULING
// ============================================================================

#[test]
fn test_once_runs_after_delay() {
    let pool = pool(1);
    let (starts, record) = recorder();

    let submitted = Instant::now();
    let handle = pool
        .schedule_once(work::from_fn(record), Duration::from_millis(100))
        .unwrap();

    assert!(handle.wait_finished(Duration::from_secs(2)));
    assert_eq!(handle.phase(), HandlePhase::Completed);
    assert_eq!(handle.run_count(), 1);

    let starts = starts.lock();
    assert_eq!(starts.len(), 1);
    assert!(starts[0] - submitted >= Duration::from_millis(100));
}

#[test]
fn test_earlier_deadline_runs_first() {
    let pool = pool(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let late = Arc::clone(&order);
    let slow = pool
        .schedule_once(work::from_fn(move || late.lock().push("late")), Duration::from_millis(150))
        .unwrap();
    let early = Arc::clone(&order);
    let fast = pool
        .schedule_once(work::from_fn(move || early.lock().push("early")), Duration::from_millis(30))
        .unwrap();

    assert!(slow.wait_finished(Duration::from_secs(2)));
    assert!(fast.is_finished());
    assert_eq!(*order.lock(), vec!["early", "late"]);
}

#[test]
fn test_cancel_before_firing() {
    let pool = pool(1);
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);

    let handle = pool
        .schedule_once(
            work::from_fn(move || flag.store(true, Ordering::SeqCst)),
            Duration::from_millis(200),
        )
        .unwrap();
    handle.cancel().unwrap();
    assert_eq!(handle.phase(), HandlePhase::Cancelled);
    assert!(handle.cancel().is_err());

    thread::sleep(Duration::from_millis(350));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(handle.run_count(), 0);
}

// ============================================================================
// REPEATING SCHEDULING
// ============================================================================

#[test]
fn test_periodic_fixed_rate_spacing() {
    let pool = pool(1);
    let (starts, record) = recorder();

    let handle = pool
        .schedule_periodic(work::from_fn(record), Duration::ZERO, Duration::from_millis(100))
        .unwrap();
    thread::sleep(Duration::from_millis(550));
    handle.cancel().unwrap();
    assert!(handle.wait_finished(Duration::from_secs(1)));

    let after_cancel = starts.lock().len();
    thread::sleep(Duration::from_millis(250));
    assert_eq!(starts.lock().len(), after_cancel);

    let starts = starts.lock().clone();
    assert!(starts.len() >= 4, "expected at least 4 runs, got {}", starts.len());
    // Rate is measured from scheduled starts, so the total span tracks the interval.
    let span = *starts.last().unwrap() - starts[0];
    let expected = Duration::from_millis(100) * u32::try_from(starts.len() - 1).unwrap();
    assert!(span + Duration::from_millis(60) >= expected);
    assert!(span <= expected + Duration::from_millis(150));
}

#[test]
fn test_periodic_overrun_delays_without_overlap() {
    let pool = pool(4);
    let (starts, record) = recorder();
    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));

    let (c, m) = (Arc::clone(&concurrent), Arc::clone(&max_concurrent));
    let handle = pool
        .schedule_periodic(
            work::from_fn(move || {
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                record();
                thread::sleep(Duration::from_millis(120));
                c.fetch_sub(1, Ordering::SeqCst);
            }),
            Duration::ZERO,
            Duration::from_millis(50),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(600));
    handle.cancel().unwrap();
    assert!(handle.wait_finished(Duration::from_secs(1)));

    assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    for gap in gaps(&starts.lock()) {
        assert!(gap >= Duration::from_millis(115), "invocations overlapped: {gap:?}");
    }
}

#[test]
fn test_sequential_fixed_delay_spacing() {
    let pool = pool(2);
    let (starts, record) = recorder();

    let handle = pool
        .schedule_sequential(
            work::from_fn(move || {
                record();
                thread::sleep(Duration::from_millis(50));
            }),
            Duration::ZERO,
            Duration::from_millis(80),
        )
        .unwrap();
    thread::sleep(Duration::from_millis(600));
    handle.cancel().unwrap();
    assert!(handle.wait_finished(Duration::from_secs(1)));

    let starts = starts.lock().clone();
    assert!(starts.len() >= 3);
    for gap in gaps(&starts) {
        // run time + interval between consecutive starts
        assert!(gap >= Duration::from_millis(125), "gap too short: {gap:?}");
        assert!(gap <= Duration::from_millis(190), "gap too long: {gap:?}");
    }
}

#[test]
fn test_failing_and_panicking_work_keeps_repeating() {
    let pool = pool(1);
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&runs);
    let handle = pool
        .schedule_periodic(
            work::try_fn(move || {
                let run = counter.fetch_add(1, Ordering::SeqCst);
                match run % 3 {
                    0 => Err(anyhow::anyhow!("transient failure")),
                    1 => panic!("worker panic"),
                    _ => Ok(()),
                }
            }),
            Duration::ZERO,
            Duration::from_millis(30),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(400));
    handle.cancel().unwrap();
    assert!(handle.wait_finished(Duration::from_secs(1)));

    assert!(runs.load(Ordering::SeqCst) >= 4);
    let stats = pool.stats();
    assert!(stats.failed_runs >= 2);
    assert!(stats.completed_runs >= 1);
}

#[test]
fn test_zero_interval_rejected() {
    let pool = pool(1);
    let result = pool.schedule_sequential(work::from_fn(|| {}), Duration::ZERO, Duration::ZERO);
    assert!(matches!(result, Err(PoolError::InvalidInterval("sequential"))));
}

// ============================================================================
// CANCELLATION AND INTERRUPTION
// ============================================================================

#[test]
fn test_cancel_lets_running_invocation_finish() {
    let pool = pool(1);
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);

    let handle = pool
        .schedule_periodic(
            work::from_fn(move || {
                thread::sleep(Duration::from_millis(150));
                flag.store(true, Ordering::SeqCst);
            }),
            Duration::ZERO,
            Duration::from_millis(500),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(handle.phase(), HandlePhase::Running);
    handle.cancel().unwrap();
    assert!(!handle.is_finished());

    assert!(handle.wait_finished(Duration::from_secs(1)));
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(handle.phase(), HandlePhase::Cancelled);
    assert_eq!(handle.run_count(), 1);
}

#[test]
fn test_interrupt_is_observed_by_running_work() {
    let pool = pool(1);
    let iterations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&iterations);

    let handle = pool
        .schedule_once(
            work::from_fn(move || {
                while !interrupted() {
                    counter.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                }
            }),
            Duration::ZERO,
        )
        .unwrap();

    thread::sleep(Duration::from_millis(60));
    handle.interrupt().unwrap();
    assert!(handle.wait_finished(Duration::from_secs(1)));
    assert!(handle.is_interrupt_requested());
    assert!(iterations.load(Ordering::SeqCst) > 0);
    assert!(!interrupted());
}

// ============================================================================
// SHUTDOWN
// ============================================================================

#[test]
fn test_graceful_shutdown_runs_pending_once_and_stops_repeating() {
    let pool = pool(2);
    let once_ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&once_ran);

    let once = pool
        .schedule_once(
            work::from_fn(move || flag.store(true, Ordering::SeqCst)),
            Duration::from_millis(100),
        )
        .unwrap();
    let periodic = pool
        .schedule_periodic(work::from_fn(|| {}), Duration::from_millis(200), Duration::from_millis(50))
        .unwrap();

    assert!(pool.shutdown(false).is_empty());
    assert!(pool.is_shutdown());
    assert!(matches!(
        pool.schedule_once(work::from_fn(|| {}), Duration::ZERO),
        Err(PoolError::Shutdown(_))
    ));

    assert!(pool.await_termination(Duration::from_secs(2)));
    assert!(pool.is_terminated());
    assert!(once_ran.load(Ordering::SeqCst));
    assert_eq!(once.phase(), HandlePhase::Completed);
    assert_eq!(periodic.phase(), HandlePhase::Cancelled);
    assert_eq!(periodic.run_count(), 0);
}

#[test]
fn test_forceful_shutdown_reports_abandoned_work() {
    let pool = pool(1);

    let running = pool
        .schedule_once(
            work::from_fn(|| {
                while !interrupted() {
                    thread::sleep(Duration::from_millis(5));
                }
            }),
            Duration::ZERO,
        )
        .unwrap();
    let waiting = pool
        .schedule_periodic(work::from_fn(|| {}), Duration::from_secs(10), Duration::from_secs(1))
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    let abandoned = pool.shutdown(true);
    assert_eq!(abandoned.len(), 2);
    assert!(abandoned.iter().any(|w| w.id == running.id() && w.was_running));
    assert!(abandoned.iter().any(|w| w.id == waiting.id() && !w.was_running));

    assert!(pool.await_termination(Duration::from_secs(2)));
    assert_eq!(running.phase(), HandlePhase::Cancelled);
    assert_eq!(waiting.phase(), HandlePhase::Cancelled);

    // Escalating again finds nothing left.
    assert!(pool.shutdown(true).is_empty());
}

#[test]
fn test_await_termination_requires_shutdown() {
    let pool = pool(1);
    pool.schedule_once(work::from_fn(|| {}), Duration::ZERO).unwrap();
    assert!(!pool.await_termination(Duration::from_millis(50)));
    assert!(!pool.is_terminated());
    pool.shutdown(false);
    assert!(pool.await_termination(Duration::from_secs(1)));
}

#[test]
fn test_stats_track_lifecycle() {
    let pool = pool(2);
    let handles: Vec<_> = (0..5)
        .map(|_| pool.schedule_once(work::from_fn(|| {}), Duration::from_millis(10)).unwrap())
        .collect();
    for handle in &handles {
        assert!(handle.wait_finished(Duration::from_secs(1)));
    }

    let stats = pool.stats();
    assert_eq!(stats.max_threads, 2);
    assert_eq!(stats.submitted, 5);
    assert_eq!(stats.completed_runs, 5);
    assert_eq!(stats.failed_runs, 0);
    assert_eq!(stats.pending, 0);
}
