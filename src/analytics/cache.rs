use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::observability::metrics::cache as cache_metrics;

type CacheKey = (u64, String);
type CachedValue = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Entries {
    values: HashMap<CacheKey, CachedValue>,
    // Insertion order for eviction
    order: VecDeque<CacheKey>,
}

/// Read-through cache of query results.
///
/// Keys carry the snapshot version a result was computed against, so a
/// result can never be served for a different load. `invalidate` drops
/// everything after a swap to release memory early.
pub struct QueryCache {
    enabled: bool,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl QueryCache {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled: enabled && capacity > 0,
            capacity,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    /// Return the cached result for `(version, query)` or compute, store and
    /// return it. Errors are never cached.
    pub fn get_or_compute<T, E, F>(&self, version: u64, query: &str, compute: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        if !self.enabled {
            return compute().map(Arc::new);
        }

        let key = (version, query.to_string());
        if let Some(hit) = self.lookup(&key) {
            if let Ok(value) = hit.downcast::<T>() {
                cache_metrics::hit();
                return Ok(value);
            }
        }
        cache_metrics::miss();

        let value = Arc::new(compute()?);
        self.store(key, Arc::clone(&value) as CachedValue);
        Ok(value)
    }

    pub fn invalidate(&self) {
        let mut entries = self.lock();
        let dropped = entries.values.len();
        entries.values.clear();
        entries.order.clear();
        cache_metrics::invalidated();
        debug!("Query cache invalidated ({} entries dropped)", dropped);
    }

    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        self.lock().values.get(key).cloned()
    }

    fn store(&self, key: CacheKey, value: CachedValue) {
        let mut entries = self.lock();
        if entries.values.insert(key.clone(), value).is_none() {
            entries.order.push_back(key);
        }
        while entries.values.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.values.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
