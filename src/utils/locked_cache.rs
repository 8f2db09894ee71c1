/// Check-or-build cache guarded by a single mutex
///
/// Every lazily-built, read-mostly cache in the crate goes through this type:
/// compiled ECSQL plans, embedded struct-array plans and the relationship
/// lookup of the related-instance finder.
///
/// The lookup and the build run under the same lock, so two callers asking
/// for the same missing key never build it twice. A builder must not touch
/// the cache it is building into.
///
/// # Configuration
///
/// `capacity` bounds the number of entries. When the cache is full the least
/// recently used entry is evicted before a new one is inserted. A capacity of
/// 0 disables caching: every lookup builds and nothing is retained.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    last_accessed: u64,
}

pub struct LockedCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    capacity: usize,
    /// Logical clock for LRU ordering, bumped on every access
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> LockedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        LockedCache {
            entries: Mutex::new(HashMap::new()),
            capacity,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cache without an entry bound
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = self.tick();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Return the cached value for `key`, building and inserting it under the
    /// lock if absent. A failed build leaves the cache untouched.
    pub fn get_or_try_build<E, F>(&self, key: &K, build: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.last_accessed = self.tick();
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = build(key)?;
        if self.capacity == 0 {
            return Ok(value);
        }
        if entries.len() >= self.capacity {
            self.evict_lru(&mut entries);
        }
        entries.insert(
            key.clone(),
            CacheEntry {
                value: value.clone(),
                last_accessed: self.tick(),
            },
        );
        Ok(value)
    }

    fn evict_lru(&self, entries: &mut HashMap<K, CacheEntry<V>>) {
        if let Some(key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone())
        {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every entry matching `predicate`
    pub fn invalidate_where(&self, predicate: impl Fn(&K) -> bool) {
        self.lock().retain(|key, _| !predicate(key));
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheMetrics {
    /// Cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_builds_once() {
        let cache: LockedCache<i64, Arc<String>> = LockedCache::unbounded();
        let mut builds = 0;
        for _ in 0..3 {
            let value = cache
                .get_or_try_build(&7, |k| -> Result<_, ()> {
                    builds += 1;
                    Ok(Arc::new(format!("class {}", k)))
                })
                .unwrap();
            assert_eq!(value.as_str(), "class 7");
        }
        assert_eq!(builds, 1);
        let metrics = cache.metrics();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 2);
    }

    #[test]
    fn test_failed_build_not_cached() {
        let cache: LockedCache<&str, i32> = LockedCache::unbounded();
        let result: Result<i32, String> = cache.get_or_try_build(&"a", |_| Err("boom".into()));
        assert!(result.is_err());
        assert!(cache.is_empty());
        let result: Result<i32, String> = cache.get_or_try_build(&"a", |_| Ok(1));
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn test_lru_eviction() {
        let cache: LockedCache<i32, i32> = LockedCache::new(2);
        cache.get_or_try_build(&1, |k| Ok::<_, ()>(*k)).unwrap();
        cache.get_or_try_build(&2, |k| Ok::<_, ()>(*k)).unwrap();
        // touch 1 so 2 becomes the eviction candidate
        assert_eq!(cache.get(&1), Some(1));
        cache.get_or_try_build(&3, |k| Ok::<_, ()>(*k)).unwrap();
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn test_zero_capacity_never_retains() {
        let cache: LockedCache<i32, i32> = LockedCache::new(0);
        cache.get_or_try_build(&1, |k| Ok::<_, ()>(*k)).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_where() {
        let cache: LockedCache<(i32, i32), i32> = LockedCache::unbounded();
        for i in 0..4 {
            cache.get_or_try_build(&(i % 2, i), |_| Ok::<_, ()>(i)).unwrap();
        }
        cache.invalidate_where(|(group, _)| *group == 0);
        assert_eq!(cache.len(), 2);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_single_build() {
        let cache: Arc<LockedCache<i32, i32>> = Arc::new(LockedCache::unbounded());
        let builds = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                thread::spawn(move || {
                    cache
                        .get_or_try_build(&1, |_| {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, ()>(10)
                        })
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 10);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
