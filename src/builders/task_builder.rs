//! Builders to construct scheduled tasks from configuration.

use std::sync::Arc;

use crate::config::{LoopConfig, TaskConfig};
use crate::core::{NamedInstanceRegistry, ScheduledTask, SchedulerError, Work};

/// Build a [`ScheduledTask`] for every task in `cfg`.
///
/// `work_factory` supplies the work for each task. Tasks are returned in
/// configuration order and are not started.
///
/// # Errors
///
/// - `SchedulerError::InvalidConfig` if the configuration fails validation
/// - any error returned by `work_factory`
pub fn build_tasks<W, F>(
    cfg: &LoopConfig,
    registry: &Arc<NamedInstanceRegistry>,
    mut work_factory: F,
) -> Result<Vec<ScheduledTask>, SchedulerError>
where
    W: Work,
    F: FnMut(&TaskConfig) -> Result<W, SchedulerError>,
{
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    cfg.tasks
        .iter()
        .map(|task_cfg| {
            let work = work_factory(task_cfg)?;
            ScheduledTask::from_config(task_cfg, work, Arc::clone(registry))
        })
        .collect()
}
