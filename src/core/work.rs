//! Units of work that a thread pool can run.

use std::borrow::Cow;

use super::AppResult;

/// Abstraction for a zero-argument unit of work.
///
/// Implementations may fail; failures (and panics) are logged by the pool and
/// never prevent future invocations of a repeating schedule.
///
/// # Example
///
/// ```rust
/// use prometheus_task_loop::core::{AppResult, Work};
///
/// struct Heartbeat;
///
/// impl Work for Heartbeat {
///     fn run(&self) -> AppResult<()> {
///         tracing::info!("still alive");
///         Ok(())
///     }
///
///     fn label(&self) -> std::borrow::Cow<'_, str> {
///         "heartbeat".into()
///     }
/// }
/// ```
pub trait Work: Send + Sync + 'static {
    /// Run the work once.
    ///
    /// # Errors
    ///
    /// Any error is logged by the caller and otherwise ignored.
    fn run(&self) -> AppResult<()>;

    /// Short label used in logs and when reporting abandoned work.
    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed("work")
    }
}

impl<W: Work + ?Sized> Work for std::sync::Arc<W> {
    fn run(&self) -> AppResult<()> {
        (**self).run()
    }

    fn label(&self) -> Cow<'_, str> {
        (**self).label()
    }
}

impl<W: Work + ?Sized> Work for Box<W> {
    fn run(&self) -> AppResult<()> {
        (**self).run()
    }

    fn label(&self) -> Cow<'_, str> {
        (**self).label()
    }
}

/// Work backed by a closure.
pub struct FnWork<F> {
    f: F,
}

impl<F> Work for FnWork<F>
where
    F: Fn() -> AppResult<()> + Send + Sync + 'static,
{
    fn run(&self) -> AppResult<()> {
        (self.f)()
    }
}

/// Wrap an infallible closure as [`Work`].
pub fn from_fn<F>(f: F) -> FnWork<impl Fn() -> AppResult<()> + Send + Sync + 'static>
where
    F: Fn() + Send + Sync + 'static,
{
    FnWork {
        f: move || {
            f();
            Ok(())
        },
    }
}

/// Wrap a fallible closure as [`Work`].
pub const fn try_fn<F>(f: F) -> FnWork<F>
where
    F: Fn() -> AppResult<()> + Send + Sync + 'static,
{
    FnWork { f }
}
