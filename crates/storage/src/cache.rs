//! In-memory cache capability
//!
//! The registry keeps two caches in front of the durable store: instance to
//! last-known state, and instance to persisted record guid. Both are reached
//! through the [`Cache`] trait so deployments can plug in an evicting cache.
//! [`ConcurrentCache`] is the default and never evicts.

use dashmap::DashMap;
use std::hash::Hash;

/// Thread-safe key/value cache
///
/// Single calls are atomic. Read-modify-write sequences built from several
/// calls are not; callers must tolerate the races.
pub trait Cache<K, V>: Send + Sync {
    /// Cached value for `key`, if present
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or replace the value for `key`
    fn put(&self, key: K, value: V);

    /// True if `key` is cached
    fn contains(&self, key: &K) -> bool;

    /// Snapshot of the cached keys
    fn keys(&self) -> Vec<K>;

    /// Drop `key`, returning its value if it was cached
    fn remove(&self, key: &K) -> Option<V>;

    /// Drop every entry
    fn clear(&self);

    /// Number of cached entries
    fn len(&self) -> usize;

    /// True if nothing is cached
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded cache over a sharded concurrent map
pub struct ConcurrentCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, V>,
}

impl<K, V> ConcurrentCache<K, V>
where
    K: Eq + Hash,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> Default for ConcurrentCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Cache<K, V> for ConcurrentCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn put(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
