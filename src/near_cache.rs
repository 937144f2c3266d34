//! Per-process cache tier: [`crate::local_store::LocalStore`] guarded by
//! [`crate::slot_table::SlotTable`] admission checks.

use crate::local_store::LocalStore;
use crate::metrics::METRICS;
use crate::slot_table::SlotTable;
use std::sync::atomic::Ordering;

pub struct NearCache {
    store: LocalStore,
    slots: SlotTable,
}

impl NearCache {
    pub fn new(slot_count: usize) -> Result<Self, crate::Error> {
        Ok(Self {
            store: LocalStore::new(),
            slots: SlotTable::new(slot_count)?,
        })
    }

    /// Local lookup. Does not touch the slot table: a plain read is never
    /// racy with admission, only a miss→fetch→populate sequence is.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.store.get(key);
        if value.is_some() {
            METRICS.near_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            METRICS.near_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    pub fn try_own(&self, key: &str) -> i64 {
        let slot = self.slots.slot_of(key);
        self.slots.try_own(slot)
    }

    pub fn release_if_owned(&self, token: i64, key: &str) {
        let slot = self.slots.slot_of(key);
        self.slots.release(slot, token);
    }

    /// Admit `value` at `key` only if nothing raced the caller's ownership
    /// window. Returns whether the value was actually written.
    pub fn put_if_available(&self, token: i64, key: &str, value: Vec<u8>) -> bool {
        let slot = self.slots.slot_of(key);
        if self.slots.can_admit(slot, token) {
            self.store.put(key.to_string(), value);
            METRICS.near_cache_admits.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            METRICS
                .near_cache_admit_aborts
                .fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(key);
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn own_all(&self) {
        self.slots.own_all();
    }

    pub fn release_all(&self) {
        self.slots.release_all();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_populate_then_hit() {
        let cache = NearCache::new(16).unwrap();
        assert_eq!(cache.get("k"), None);
        let token = cache.try_own("k");
        assert!(cache.put_if_available(token, "k", vec![1]));
        cache.release_if_owned(token, "k");
        assert_eq!(cache.get("k"), Some(vec![1]));
    }

    #[test]
    fn concurrent_invalidation_aborts_admission() {
        let cache = NearCache::new(16).unwrap();
        let token = cache.try_own("k");

        // racing invalidation: another caller owns, then a remove releases it
        let invalidation_token = cache.try_own("k");
        cache.remove("k");
        cache.release_if_owned(invalidation_token, "k");

        assert!(!cache.put_if_available(token, "k", vec![9]));
        cache.release_if_owned(token, "k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let cache = NearCache::new(16).unwrap();
        let token = cache.try_own("k");
        cache.put_if_available(token, "k", vec![1]);
        cache.release_if_owned(token, "k");

        cache.remove("k");
        cache.remove("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn clear_evicts_everything() {
        let cache = NearCache::new(16).unwrap();
        let t1 = cache.try_own("a");
        cache.put_if_available(t1, "a", vec![1]);
        cache.release_if_owned(t1, "a");

        cache.own_all();
        cache.clear();
        cache.release_all();

        assert!(cache.is_empty());
    }
}
