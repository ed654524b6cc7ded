//! Plumbing shared by the binders.
//!
//! Every binder keeps at most one in-flight [BindTask] per target.  Starting a new bind on a target cancels whatever
//! was in flight for it, so whichever bind was issued last is the one the target ends up showing.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::*;

/// Everything a binder needs from the outside world.
#[derive(Clone)]
pub struct BindContext {
    pub(crate) cache: Arc<MetadataCache>,
    pub(crate) defaults: Arc<dyn DisplayableDefaults>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) main: MainHandle,
}

impl BindContext {
    pub fn new(
        cache: Arc<MetadataCache>,
        defaults: Arc<dyn DisplayableDefaults>,
        executor: Arc<dyn Executor>,
        main: MainHandle,
    ) -> BindContext {
        BindContext {
            cache,
            defaults,
            executor,
            main,
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Run `f` as its own job, so that writing to the cache never holds up the owning thread.
    pub(crate) fn populate_later(&self, f: impl FnOnce(&MetadataCache) + Send + 'static) {
        let cache = self.cache.clone();
        self.executor.execute(Box::new(move || f(&cache)));
    }
}

/// Identifies a target by its allocation.
///
/// An in-flight task holds a strong reference to its target, so the address can't be reused while a registry entry
/// for it exists.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TargetKey(usize);

impl TargetKey {
    pub(crate) fn of<T: ?Sized>(target: &Arc<T>) -> TargetKey {
        TargetKey(Arc::as_ptr(target) as *const () as usize)
    }
}

/// The in-flight tasks of one binder, by target.
#[derive(Clone, Default)]
pub(crate) struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<TargetKey, TaskHandle, ahash::RandomState>>>,
}

impl TaskRegistry {
    /// Record `handle` as the task for `target`, cancelling the one it replaces.
    pub(crate) fn track(&self, target: TargetKey, handle: TaskHandle) {
        if let Some(old) = self.tasks.lock().insert(target, handle) {
            old.cancel();
        }
    }

    pub(crate) fn cancel(&self, target: TargetKey) -> bool {
        match self.tasks.lock().remove(&target) {
            Some(old) => {
                old.cancel();
                debug!(task = old.id(), "cancelled in-flight bind");
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.tasks.lock());
        for handle in drained.values() {
            handle.cancel();
        }
        drained.len()
    }

    /// Forget a task which completed, unless a newer one has already replaced it.
    pub(crate) fn release(&self, target: TargetKey, task_id: u64) {
        let mut tasks = self.tasks.lock();
        if tasks.get(&target).map_or(false, |h| h.id() == task_id) {
            tasks.remove(&target);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// What a background fetch came back with.
#[derive(Debug)]
pub(crate) enum Fetched<V> {
    /// Found in the cache; nothing to write back.
    Cached(V),
    /// Read from the item; should be written back to the cache once applied.
    Read(V),
    /// Nothing to show, so the default is used.
    Missing,
}

impl<V> Fetched<V> {
    /// Classify an item read, logging failures but not legitimately missing values.
    pub(crate) fn from_read(
        kind: MetadataKind,
        item: &SharedItem,
        read: Result<Option<V>, ReadError>,
    ) -> Fetched<V> {
        match read {
            Ok(Some(v)) => Fetched::Read(v),
            Ok(None) => Fetched::Missing,
            Err(e) => {
                warn!(
                    kind = %kind,
                    item = ?ItemRef::new(item),
                    error = %e,
                    "could not read item; using default"
                );
                Fetched::Missing
            }
        }
    }
}
