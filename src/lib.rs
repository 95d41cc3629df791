//! # Prometheus Task Loop
//!
//! Named, repeatable, cancellable background tasks on named thread pools.
//!
//! A [`ScheduledTask`](core::ScheduledTask) is a unit of work with a name, a
//! pool name and a [`Repetition`](core::Repetition) policy:
//!
//! - **Once**: a single invocation after an initial delay
//! - **Periodic**: fixed rate, each start spaced from the previous start
//! - **Sequential**: fixed delay, each start spaced from the previous end
//!
//! Tasks find their [`ThreadPool`](core::ThreadPool) by name through a
//! [`NamedInstanceRegistry`](core::NamedInstanceRegistry), which creates each
//! `(type, name)` instance exactly once even under concurrent lookups. Pools own
//! dedicated OS threads, start them lazily on first use, and support graceful
//! and forceful shutdown.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_task_loop::core::{work, NamedInstanceRegistry, Repetition, ScheduledTask};
//!
//! prometheus_task_loop::util::init_tracing();
//! let registry = Arc::new(NamedInstanceRegistry::new());
//!
//! let report = ScheduledTask::new("report", work::from_fn(|| tracing::info!("report")), Arc::clone(&registry))
//!     .with_pool_name("p1")
//!     .with_repetition(Repetition::Sequential)
//!     .with_interval(Duration::from_secs(30));
//! report.start();
//!
//! let reminder = ScheduledTask::deferred(
//!     work::from_fn(|| tracing::info!("reminder")),
//!     Duration::from_secs(10),
//!     registry,
//! );
//! reminder.start();
//! ```
//!
//! Work is cooperative: a forceful stop or shutdown raises a flag that running
//! work observes through [`core::interrupted`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduling primitives, tasks and the named-instance registry.
pub mod core;
/// Configuration models for pools and tasks.
pub mod config;
/// Builders to construct pools and tasks from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
