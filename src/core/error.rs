//! Error types for task scheduling and named-instance lookup.

use thiserror::Error;

use crate::core::thread_pool::PoolError;

/// Errors produced by scheduled tasks and the named-instance registry.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task already has a live activation.
    #[error("task `{0}` is already scheduled")]
    AlreadyRunning(String),
    /// The task has never been scheduled, so there is nothing to cancel.
    #[error("task `{0}` has no schedule handle")]
    NotScheduled(String),
    /// The activation completed or was cancelled before this request.
    #[error("schedule handle `{0}` already finished")]
    AlreadyFinished(String),
    /// An instance with this name is already registered for the type.
    #[error("instance `{name}` already exists for type `{type_name}`")]
    AlreadyExists {
        /// Instance name.
        name: String,
        /// Registered type.
        type_name: &'static str,
    },
    /// The factory for a named instance failed.
    #[error("failed to create instance `{name}` of type `{type_name}`: {source}")]
    Creation {
        /// Instance name.
        name: String,
        /// Requested type.
        type_name: &'static str,
        /// Underlying factory error.
        #[source]
        source: anyhow::Error,
    },
    /// The thread pool refused or failed the request.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for user work and factories.
pub type AppResult<T> = Result<T, anyhow::Error>;
