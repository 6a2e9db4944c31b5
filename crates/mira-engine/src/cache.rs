//! The bounded resource cache: LRU with an optional secondary byte budget.
//!
//! One utility covers both eviction strategies the engine needs: plain
//! count-bounded LRU (comment/terminal slots, view state) and dual-bounded
//! LRU where cumulative weight also caps the cache (file content). Eviction
//! hands the removed values back to the caller, which runs disposal.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    /// Logical tick of the most recent touch, not wall-clock time.
    last_used_at: u64,
    weight: u64,
}

#[derive(Debug)]
pub struct BoundedCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    max_entries: usize,
    max_weight: Option<u64>,
    total_weight: u64,
    /// The currently-active key; never evicted.
    protected: Option<K>,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Count-bounded LRU.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            max_weight: None,
            total_weight: 0,
            protected: None,
            clock: 0,
        }
    }

    /// Dual-bounded LRU: evicts while count or cumulative weight exceed the
    /// budget.
    pub fn with_weight_budget(max_entries: usize, max_weight: u64) -> Self {
        Self {
            max_weight: Some(max_weight),
            ..Self::with_capacity(max_entries)
        }
    }

    /// Mark a key as the active one; it survives eviction until another key
    /// (or `None`) takes its place.
    pub fn protect(&mut self, key: Option<K>) {
        self.protected = key;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Move a key to most-recently-used. Returns false if absent.
    pub fn touch(&mut self, key: &K) -> bool {
        self.clock += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used_at = self.clock;
                true
            }
            None => false,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.touch(key);
        self.peek(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used_at = clock;
            &mut entry.value
        })
    }

    /// Insert (or replace) an entry, then evict least-recently-used entries
    /// until both budgets hold. The evicted pairs are returned so the owner
    /// can run disposal; the protected key is never among them.
    pub fn insert(&mut self, key: K, value: V, weight: u64) -> Vec<(K, V)> {
        self.clock += 1;
        if let Some(previous) = self.entries.insert(
            key,
            CacheEntry {
                value,
                last_used_at: self.clock,
                weight,
            },
        ) {
            self.total_weight -= previous.weight;
        }
        self.total_weight += weight;
        self.evict_overflow()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.total_weight -= entry.weight;
        Some(entry.value)
    }

    /// Drain every entry (for teardown); the caller disposes them.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.total_weight = 0;
        self.entries
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries
            .iter_mut()
            .map(|(key, entry)| (key, &mut entry.value))
    }

    fn over_budget(&self) -> bool {
        if self.entries.len() > self.max_entries {
            return true;
        }
        match self.max_weight {
            Some(max) => self.total_weight > max,
            None => false,
        }
    }

    fn evict_overflow(&mut self) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.over_budget() {
            let victim = self
                .entries
                .iter()
                .filter(|(key, _)| Some(*key) != self.protected.as_ref())
                .min_by_key(|(_, entry)| entry.last_used_at)
                .map(|(key, _)| key.clone());

            let Some(victim) = victim else {
                // Only the protected entry remains; it is always retained.
                break;
            };
            if let Some(value) = self.remove(&victim) {
                evicted.push((victim, value));
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_bound_evicts_least_recently_used() {
        let mut cache = BoundedCache::with_capacity(2);
        assert!(cache.insert("a", 1, 1).is_empty());
        assert!(cache.insert("b", 2, 1).is_empty());

        // Touch "a" so "b" becomes the eviction victim.
        cache.touch(&"a");
        let evicted = cache.insert("c", 3, 1);

        assert_eq!(evicted, vec![("b", 2)]);
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn protected_key_survives_eviction() {
        let mut cache = BoundedCache::with_capacity(2);
        cache.insert("active", 0, 1);
        cache.protect(Some("active"));

        cache.insert("b", 1, 1);
        cache.insert("c", 2, 1);
        cache.insert("d", 3, 1);

        assert!(cache.contains(&"active"));
        assert!(cache.len() <= 2);
    }

    #[test]
    fn weight_budget_evicts_even_under_count_cap() {
        let mut cache = BoundedCache::with_weight_budget(40, 100);
        cache.insert("small", (), 10);
        cache.insert("big", (), 95);

        // 105 > 100: the oldest-touched entry goes, even though count is 2.
        assert!(!cache.contains(&"small"));
        assert!(cache.contains(&"big"));
        assert!(cache.total_weight() <= 100);
    }

    #[test]
    fn replacing_an_entry_adjusts_weight() {
        let mut cache = BoundedCache::with_weight_budget(40, 100);
        cache.insert("a", (), 60);
        cache.insert("a", (), 20);
        assert_eq!(cache.total_weight(), 20);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_never_leaves_both_budgets_exceeded() {
        let mut cache = BoundedCache::with_weight_budget(3, 50);
        for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            cache.insert(*key, (), 20 + i as u64);
            assert!(cache.len() <= 3);
            assert!(cache.total_weight() <= 50);
        }
    }
}
