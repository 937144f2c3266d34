//! Per-process storage backing the near-cache. A thin, typed wrapper over a
//! concurrent map — no coherence logic lives here, that's [`crate::slot_table`].

use dashmap::DashMap;

/// Concurrent key/value store for cached bytes.
pub struct LocalStore {
    entries: DashMap<String, Vec<u8>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn put(&self, key: String, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = LocalStore::new();
        store.put("k".into(), vec![1, 2, 3]);
        assert_eq!(store.get("k"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn remove_clears_single_key() {
        let store = LocalStore::new();
        store.put("k".into(), vec![1]);
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn clear_empties_the_store() {
        let store = LocalStore::new();
        store.put("a".into(), vec![1]);
        store.put("b".into(), vec![2]);
        store.clear();
        assert!(store.is_empty());
    }
}
