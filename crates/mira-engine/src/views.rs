//! Count-bounded, disposable per-session slots.
//!
//! Three applications share this shape: per-session UI view state (cap 50,
//! the active session protected from eviction), and the per-workspace
//! comment and terminal sub-caches (cap 20 each). A slot bundles its data
//! with a [`Scope`] so eviction tears down whatever the owner attached.

use crate::cache::BoundedCache;
use crate::scope::Scope;

pub const VIEW_STATE_LIMIT: usize = 50;
pub const SESSION_SLOT_LIMIT: usize = 20;

/// Arbitrary state plus the teardown scope for anything reactive hanging
/// off it.
pub struct SessionSlot<T> {
    pub data: T,
    pub scope: Scope,
}

impl<T> SessionSlot<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            scope: Scope::new(),
        }
    }
}

pub struct SlotCache<T> {
    slots: BoundedCache<String, SessionSlot<T>>,
}

impl<T> SlotCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: BoundedCache::with_capacity(capacity),
        }
    }

    /// Mark the currently-active key; it is always retained.
    pub fn set_active(&mut self, key: Option<&str>) {
        self.slots.protect(key.map(str::to_string));
        if let Some(key) = key {
            self.slots.touch(&key.to_string());
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&mut SessionSlot<T>> {
        self.slots.get_mut(&key.to_string())
    }

    pub fn get_or_insert_with(
        &mut self,
        key: &str,
        init: impl FnOnce() -> T,
    ) -> &mut SessionSlot<T> {
        if !self.slots.contains(&key.to_string()) {
            let evicted = self
                .slots
                .insert(key.to_string(), SessionSlot::new(init()), 1);
            dispose_all(evicted);
        }
        self.slots
            .get_mut(&key.to_string())
            .expect("slot inserted above")
    }

    pub fn remove(&mut self, key: &str) {
        if let Some(slot) = self.slots.remove(&key.to_string()) {
            slot.scope.dispose();
        }
    }

    pub fn clear(&mut self) {
        dispose_all(self.slots.drain());
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains(&key.to_string())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut SessionSlot<T>)> {
        self.slots.iter_mut()
    }
}

fn dispose_all<T>(evicted: Vec<(String, SessionSlot<T>)>) {
    for (_, slot) in evicted {
        slot.scope.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn eviction_disposes_the_slot_scope() {
        let disposed = Arc::new(AtomicU32::new(0));
        let mut cache: SlotCache<u32> = SlotCache::new(2);

        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            let slot = cache.get_or_insert_with(key, || i as u32);
            let counter = Arc::clone(&disposed);
            slot.scope.defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn active_slot_is_never_evicted() {
        let mut cache: SlotCache<&str> = SlotCache::new(2);
        cache.get_or_insert_with("active", || "kept");
        cache.set_active(Some("active"));

        for key in ["b", "c", "d", "e"] {
            cache.get_or_insert_with(key, || "filler");
        }

        assert!(cache.contains("active"));
        assert!(cache.len() <= 2);
    }

    #[test]
    fn get_or_insert_reuses_existing_data() {
        let mut cache: SlotCache<u32> = SlotCache::new(5);
        cache.get_or_insert_with("a", || 1).data = 42;
        assert_eq!(cache.get_or_insert_with("a", || 0).data, 42);
    }

    #[test]
    fn clear_disposes_everything() {
        let disposed = Arc::new(AtomicU32::new(0));
        let mut cache: SlotCache<()> = SlotCache::new(10);
        for key in ["a", "b", "c"] {
            let counter = Arc::clone(&disposed);
            cache
                .get_or_insert_with(key, || ())
                .scope
                .defer(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
        }

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(disposed.load(Ordering::SeqCst), 3);
    }
}
