//! Builders to construct thread pools from configuration.

use std::sync::Arc;

use crate::config::{LoopConfig, ThreadPoolConfig};
use crate::core::{NamedInstanceRegistry, SchedulerError, ThreadPool};

/// Builds one named [`ThreadPool`] and registers it.
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    name: String,
    config: ThreadPoolConfig,
}

impl PoolBuilder {
    /// Builder for the pool `name`.
    pub fn new(name: impl Into<String>, config: ThreadPoolConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool configuration as it will be built.
    #[must_use]
    pub const fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Construct the pool without registering it.
    ///
    /// The default thread name prefix is replaced by the pool name so pool
    /// threads and log lines identify the pool.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Pool` if the configuration is invalid.
    pub fn build(&self) -> Result<ThreadPool, SchedulerError> {
        let mut config = self.config.clone();
        if config.thread_name_prefix == ThreadPoolConfig::default().thread_name_prefix {
            config.thread_name_prefix.clone_from(&self.name);
        }
        Ok(ThreadPool::new(config)?)
    }

    /// Construct the pool and register it under its name.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Pool` if the configuration is invalid
    /// - `SchedulerError::AlreadyExists` if a pool with this name is registered
    pub fn register(&self, registry: &NamedInstanceRegistry) -> Result<Arc<ThreadPool>, SchedulerError> {
        registry.register(&self.name, self.build()?)
    }
}

/// Build and register every pool in `cfg`.
///
/// Pools are registered in name order; on error, pools registered before the
/// failing one stay registered.
///
/// # Errors
///
/// - `SchedulerError::InvalidConfig` if the configuration fails validation
/// - `SchedulerError::AlreadyExists` if a pool name is already registered
pub fn build_pools(
    cfg: &LoopConfig,
    registry: &NamedInstanceRegistry,
) -> Result<Vec<Arc<ThreadPool>>, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let mut names: Vec<_> = cfg.pools.keys().collect();
    names.sort();

    let mut pools = Vec::with_capacity(names.len());
    for name in names {
        let builder = PoolBuilder::new(name.clone(), cfg.pools[name].clone());
        pools.push(builder.register(registry)?);
    }
    Ok(pools)
}
