//! Bounded memoization cache
//!
//! Fixed-capacity map with oldest-first eviction. On overflow the oldest 20%
//! of insertion order is dropped before the new entry is stored. Values are
//! always re-derivable, so callers never depend on an entry being retained.

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Share of entries evicted when the cache is full (1 / EVICTION_DIVISOR)
const EVICTION_DIVISOR: usize = 5;

/// Generic bounded cache with insertion-order eviction
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    /// Insertion order, oldest first
    order: VecDeque<K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: HashMap::new(), order: VecDeque::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Insert or replace a value
    ///
    /// Replacing an existing key keeps its original insertion position.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = value;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    /// Return the cached value or compute, store and return it
    pub fn get_or_insert_with<F>(&mut self, key: K, compute: F) -> &V
    where
        F: FnOnce() -> V,
    {
        if !self.entries.contains_key(&key) {
            let value = compute();
            self.insert(key.clone(), value);
        }
        // Present: either already cached or inserted above (the new key is never evicted).
        &self.entries[&key]
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Evict the oldest 20% of entries (at least one)
    fn evict_oldest(&mut self) {
        let evict_count = (self.capacity / EVICTION_DIVISOR).max(1);
        for _ in 0..evict_count {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                },
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = BoundedCache::new(4);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        assert_eq!(cache.get("a"), Some(&1));
        assert_eq!(cache.get("b"), Some(&2));
        assert_eq!(cache.get("c"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_evicts_oldest_fifth_on_overflow() {
        let mut cache = BoundedCache::new(10);
        for i in 0..10 {
            cache.insert(i, i * 10);
        }
        assert_eq!(cache.len(), 10);

        // Overflow drops the two oldest (20% of 10) and stores the new key
        cache.insert(10, 100);
        assert_eq!(cache.len(), 9);
        assert!(!cache.contains_key(&0));
        assert!(!cache.contains_key(&1));
        assert!(cache.contains_key(&2));
        assert_eq!(cache.get(&10), Some(&100));
    }

    #[test]
    fn test_small_capacity_evicts_at_least_one() {
        let mut cache = BoundedCache::new(2);
        cache.insert("x", 1);
        cache.insert("y", 2);
        cache.insert("z", 3);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("x"));
        assert_eq!(cache.get("z"), Some(&3));
    }

    #[test]
    fn test_capacity_one_keeps_inserting_entry() {
        let mut cache = BoundedCache::new(0);
        assert_eq!(cache.capacity(), 1);

        cache.insert(1, "one");
        cache.insert(2, "two");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(&"two"));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut cache = BoundedCache::new(5);
        for i in 0..5 {
            cache.insert(i, 0);
        }
        cache.insert(0, 42);
        assert_eq!(cache.get(&0), Some(&42));

        // Key 0 is still the oldest and goes first
        cache.insert(5, 0);
        assert!(!cache.contains_key(&0));
        assert!(cache.contains_key(&1));
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let mut cache = BoundedCache::new(3);
        let mut calls = 0;

        let first = *cache.get_or_insert_with("k", || {
            calls += 1;
            7
        });
        let second = *cache.get_or_insert_with("k", || {
            calls += 1;
            8
        });

        assert_eq!(first, 7);
        assert_eq!(second, 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = BoundedCache::new(3);
        cache.insert(1, 1);
        cache.clear();
        assert!(cache.is_empty());
        cache.insert(2, 2);
        assert_eq!(cache.len(), 1);
    }
}
