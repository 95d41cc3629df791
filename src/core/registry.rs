//! Named-instance registry.
//!
//! Where a singleton guarantees one instance per type, the registry guarantees one
//! instance per `(type, name)` pair. Tasks use it to find the [`ThreadPool`] for
//! their pool name; any other `Send + Sync` type can be stored the same way.
//!
//! Every operation takes one registry-wide lock. Lookups are setup-time work, not
//! a hot path, and holding the lock across a factory call is what guarantees a
//! single construction per pair. Factories must therefore not call back into the
//! same registry.
//!
//! [`ThreadPool`]: crate::core::ThreadPool
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prometheus_task_loop::core::{NamedInstanceRegistry, ThreadPool};
//!
//! let registry = NamedInstanceRegistry::new();
//! let first: Arc<ThreadPool> = registry.get_or_default("reports");
//! let again: Arc<ThreadPool> = registry.get_or_default("reports");
//! assert!(Arc::ptr_eq(&first, &again));
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{AppResult, SchedulerError};

type Instance = Arc<dyn Any + Send + Sync>;

/// All instances registered for one type.
struct TypeBucket {
    type_name: &'static str,
    instances: HashMap<String, Instance>,
}

/// Mapping from `(type, name)` to a single shared instance.
#[derive(Default)]
pub struct NamedInstanceRegistry {
    buckets: Mutex<HashMap<TypeId, TypeBucket>>,
}

impl NamedInstanceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an instance of `T` is registered under `name`.
    #[must_use]
    pub fn exists<T: Any + Send + Sync>(&self, name: &str) -> bool {
        self.buckets
            .lock()
            .get(&TypeId::of::<T>())
            .is_some_and(|bucket| bucket.instances.contains_key(name))
    }

    /// The instance of `T` registered under `name`, if any.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let buckets = self.buckets.lock();
        let instance = buckets.get(&TypeId::of::<T>())?.instances.get(name)?;
        downcast(Arc::clone(instance))
    }

    /// Return the instance of `T` named `name`, creating it with `factory` if absent.
    ///
    /// Concurrent callers for the same pair all receive the one instance; the
    /// factory runs at most once.
    pub fn get_or_create<T, F>(&self, name: &str, factory: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut buckets = self.buckets.lock();
        if let Some(existing) = buckets
            .get(&TypeId::of::<T>())
            .and_then(|bucket| bucket.instances.get(name).cloned())
            .and_then(downcast::<T>)
        {
            return existing;
        }
        // The bucket is created only once the factory has returned.
        let created = Arc::new(factory());
        let bucket = bucket_for::<T>(&mut buckets);
        bucket
            .instances
            .insert(name.to_owned(), Arc::clone(&created) as Instance);
        debug!(name = %name, type_name = bucket.type_name, "Named instance created");
        created
    }

    /// Like [`get_or_create`](Self::get_or_create) for a fallible factory.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Creation` if the factory fails; nothing is stored.
    pub fn get_or_try_create<T, F>(&self, name: &str, factory: F) -> Result<Arc<T>, SchedulerError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> AppResult<T>,
    {
        let mut buckets = self.buckets.lock();
        if let Some(existing) = buckets
            .get(&TypeId::of::<T>())
            .and_then(|bucket| bucket.instances.get(name).cloned())
            .and_then(downcast::<T>)
        {
            return Ok(existing);
        }

        let created = Arc::new(factory().map_err(|source| SchedulerError::Creation {
            name: name.to_owned(),
            type_name: type_name::<T>(),
            source,
        })?);
        let bucket = bucket_for::<T>(&mut buckets);
        bucket
            .instances
            .insert(name.to_owned(), Arc::clone(&created) as Instance);
        debug!(name = %name, type_name = bucket.type_name, "Named instance created");
        Ok(created)
    }

    /// Return the instance of `T` named `name`, creating `T::default()` if absent.
    pub fn get_or_default<T>(&self, name: &str) -> Arc<T>
    where
        T: Any + Send + Sync + Default,
    {
        self.get_or_create(name, T::default)
    }

    /// Register `instance` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyExists` if an instance of `T` is already
    /// registered under `name`; the existing entry is left untouched.
    pub fn register<T: Any + Send + Sync>(
        &self,
        name: &str,
        instance: T,
    ) -> Result<Arc<T>, SchedulerError> {
        let shared = Arc::new(instance);
        self.register_shared(name, Arc::clone(&shared))?;
        Ok(shared)
    }

    /// Register an already shared instance under `name`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyExists` if an instance of `T` is already
    /// registered under `name`; the existing entry is left untouched.
    pub fn register_shared<T: Any + Send + Sync>(
        &self,
        name: &str,
        instance: Arc<T>,
    ) -> Result<(), SchedulerError> {
        let mut buckets = self.buckets.lock();
        let bucket = bucket_for::<T>(&mut buckets);
        if bucket.instances.contains_key(name) {
            return Err(SchedulerError::AlreadyExists {
                name: name.to_owned(),
                type_name: bucket.type_name,
            });
        }
        bucket.instances.insert(name.to_owned(), instance as Instance);
        debug!(name = %name, type_name = bucket.type_name, "Named instance registered");
        Ok(())
    }

    /// Snapshot of the names registered for `T`; empty if the type is unknown.
    #[must_use]
    pub fn list_names<T: Any + Send + Sync>(&self) -> BTreeSet<String> {
        self.buckets
            .lock()
            .get(&TypeId::of::<T>())
            .map(|bucket| bucket.instances.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove the instance of `T` named `name`, returning it if it was present.
    ///
    /// A type left without instances is dropped from the registry.
    pub fn evict<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let mut buckets = self.buckets.lock();
        let type_id = TypeId::of::<T>();
        let bucket = buckets.get_mut(&type_id)?;
        let removed = bucket.instances.remove(name)?;
        debug!(name = %name, type_name = bucket.type_name, "Named instance evicted");
        if bucket.instances.is_empty() {
            buckets.remove(&type_id);
        }
        downcast(removed)
    }

    /// Number of types with at least one registered instance.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

impl std::fmt::Debug for NamedInstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.lock();
        let mut map = f.debug_map();
        for bucket in buckets.values() {
            let mut names: Vec<_> = bucket.instances.keys().collect();
            names.sort();
            map.entry(&bucket.type_name, &names);
        }
        map.finish()
    }
}

fn bucket_for<T: Any>(buckets: &mut HashMap<TypeId, TypeBucket>) -> &mut TypeBucket {
    buckets
        .entry(TypeId::of::<T>())
        .or_insert_with(|| TypeBucket {
            type_name: type_name::<T>(),
            instances: HashMap::new(),
        })
}

fn downcast<T: Any + Send + Sync>(instance: Instance) -> Option<Arc<T>> {
    // Buckets are keyed by TypeId, so this only fails on a registry bug.
    instance.downcast::<T>().ok()
}
