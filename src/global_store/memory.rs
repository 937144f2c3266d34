//! In-memory [`GlobalStoreClient`] double. Single shard, unbounded log —
//! exists for tests and the demo binary, never for production traffic.

use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ChangeRecord, EventKind, GlobalStoreClient, ShardBatch, ShardIteratorKind};
use crate::Error;

const SHARD_ID: &str = "shard-0";

pub struct InMemoryGlobalStore {
    data: DashMap<String, Vec<u8>>,
    log: RwLock<Vec<ChangeRecord>>,
}

impl InMemoryGlobalStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            log: RwLock::new(Vec::new()),
        }
    }

    fn append(&self, event_kind: EventKind, key: &str, old_image: Option<Vec<u8>>, new_image: Option<Vec<u8>>) {
        let mut log = self.log.write().unwrap();
        log.push(ChangeRecord {
            event_kind,
            key: key.to_string(),
            old_image,
            new_image,
        });
    }
}

impl Default for InMemoryGlobalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GlobalStoreClient for InMemoryGlobalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.data.get(key).map(|v| v.clone()))
    }

    async fn put(&self, key: &str, wrapped_bytes: Vec<u8>) -> Result<(), Error> {
        let old = self.data.get(key).map(|v| v.clone());
        self.data.insert(key.to_string(), wrapped_bytes.clone());
        let kind = if old.is_some() {
            EventKind::Modify
        } else {
            EventKind::Insert
        };
        self.append(kind, key, old, Some(wrapped_bytes));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let old = self.data.remove(key).map(|(_, v)| v);
        self.append(EventKind::Remove, key, old, None);
        Ok(())
    }

    async fn replace(
        &self,
        key: &str,
        old: Option<Vec<u8>>,
        new: Option<Vec<u8>>,
    ) -> Result<bool, Error> {
        let current = self.data.get(key).map(|v| v.clone());
        if current != old {
            return Ok(false);
        }
        match &new {
            Some(bytes) => {
                self.data.insert(key.to_string(), bytes.clone());
                self.append(EventKind::Modify, key, current, new);
            }
            None => {
                self.data.remove(key);
                self.append(EventKind::Remove, key, current, None);
            }
        }
        Ok(true)
    }

    async fn clear(&self) -> Result<(), Error> {
        let keys: Vec<String> = self.data.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let old = self.data.remove(&key).map(|(_, v)| v);
            self.append(EventKind::Remove, &key, old, None);
        }
        Ok(())
    }

    async fn list_shards(&self) -> Result<Vec<String>, Error> {
        Ok(vec![SHARD_ID.to_string()])
    }

    async fn shard_iterator(
        &self,
        _shard_id: &str,
        kind: ShardIteratorKind,
    ) -> Result<String, Error> {
        let offset = match kind {
            ShardIteratorKind::Latest => self.log.read().unwrap().len(),
            ShardIteratorKind::TrimHorizon => 0,
        };
        Ok(offset.to_string())
    }

    async fn get_records(&self, cursor: &str) -> Result<ShardBatch, Error> {
        let offset: usize = cursor
            .parse()
            .map_err(|_| Error::Transient(format!("invalid cursor: {cursor}")))?;
        let log = self.log.read().unwrap();
        let records = log.get(offset..).unwrap_or(&[]).to_vec();
        let next_cursor = offset + records.len();
        Ok(ShardBatch {
            records,
            next_cursor: Some(next_cursor.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryGlobalStore::new();
        store.put("k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn replace_fails_on_mismatched_old_value() {
        let store = InMemoryGlobalStore::new();
        store.put("k", vec![1]).await.unwrap();
        let ok = store
            .replace("k", Some(vec![9]), Some(vec![2]))
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn replace_succeeds_and_emits_record() {
        let store = InMemoryGlobalStore::new();
        store.put("k", vec![1]).await.unwrap();
        let cursor = store
            .shard_iterator("shard-0", ShardIteratorKind::TrimHorizon)
            .await
            .unwrap();
        let ok = store
            .replace("k", Some(vec![1]), Some(vec![2]))
            .await
            .unwrap();
        assert!(ok);
        let batch = store.get_records(&cursor).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[1].event_kind, EventKind::Modify);
    }

    #[tokio::test]
    async fn latest_iterator_skips_history() {
        let store = InMemoryGlobalStore::new();
        store.put("k", vec![1]).await.unwrap();
        let cursor = store
            .shard_iterator("shard-0", ShardIteratorKind::Latest)
            .await
            .unwrap();
        let batch = store.get_records(&cursor).await.unwrap();
        assert!(batch.records.is_empty());
    }
}
