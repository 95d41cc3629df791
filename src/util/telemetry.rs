//! Telemetry helpers for structured logging.

/// Install a default env-filtered subscriber unless one is already set.
///
/// Log lines carry the emitting thread's name, so pool threads show up as
/// `<pool>-worker-<n>` and `<pool>-timer`; task invocations add a `task` span.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
