//! Orchestrates read-through/write-through between [`NearCache`] and
//! [`GlobalStoreClient`], and wires the change feed's invalidations back
//! into the near-cache.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::change_feed::ChangeFeedConsumer;
use crate::codec;
use crate::config::Config;
use crate::global_store::GlobalStoreClient;
use crate::listeners::{CacheChangeListener, ListenerRegistry};
use crate::metrics::METRICS;
use crate::near_cache::NearCache;
use crate::node_id::NodeId;
use crate::Error;

fn record_global_error(e: Error) -> Error {
    METRICS.global_store_errors.fetch_add(1, Ordering::Relaxed);
    e
}

/// What kind of cache this is, per the uniform Cache API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    Local,
    Global,
    Tiered,
}

/// Consistency guarantee offered by this cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyModel {
    Strong,
    Eventual,
}

/// Tiered near-cache over an authoritative [`GlobalStoreClient`], kept
/// coherent by a background [`ChangeFeedConsumer`].
pub struct TieredCache {
    near: Arc<NearCache>,
    global: Arc<dyn GlobalStoreClient>,
    node_id: NodeId,
    consumer: ChangeFeedConsumer,
}

impl TieredCache {
    /// Construct and start the background change-feed consumer.
    pub fn new(config: &Config, global: Arc<dyn GlobalStoreClient>) -> Result<Self, Error> {
        let near = Arc::new(NearCache::new(config.slot_table.slot_count)?);
        let node_id = NodeId::generate();
        let listeners = Arc::new(ListenerRegistry::new());
        listeners.register(Arc::new(NearCacheInvalidator {
            near: near.clone(),
        }));

        let consumer = ChangeFeedConsumer::spawn(
            global.clone(),
            listeners,
            node_id,
            Duration::from_millis(config.change_feed.poll_interval_millis),
        );

        Ok(Self {
            near,
            global,
            node_id,
            consumer,
        })
    }

    pub fn cache_type(&self) -> CacheType {
        CacheType::Tiered
    }

    pub fn consistency_model(&self) -> ConsistencyModel {
        ConsistencyModel::Eventual
    }

    /// Stop the background change-feed consumer.
    pub fn shutdown(&self) {
        self.consumer.shutdown();
    }

    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        if let Some(bytes) = self.near.get(key) {
            return Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| Error::Serialization(e.to_string()))?,
            ));
        }

        let token = self.near.try_own(key);
        let result = self.fetch_and_admit(key, token).await;
        self.near.release_if_owned(token, key);
        result
    }

    async fn fetch_and_admit<T>(&self, key: &str, token: i64) -> Result<Option<T>, Error>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let wrapped = self.global.get(key).await.map_err(record_global_error)?;
        let Some(wrapped) = wrapped else {
            return Ok(None);
        };
        let (_, value): (Option<NodeId>, T) = codec::decode(&wrapped)?;
        let plain = bincode::serialize(&value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.near.put_if_available(token, key, plain);
        Ok(Some(value))
    }

    /// Force a re-fetch from the authoritative store, bypassing any local hit.
    pub async fn refresh<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let token = self.near.try_own(key);
        self.near.remove(key);
        let result = self.fetch_and_admit(key, token).await;
        self.near.release_if_owned(token, key);
        result
    }

    /// A `None` value is equivalent to [`Self::remove`].
    pub async fn put<T>(&self, key: &str, value: Option<T>) -> Result<(), Error>
    where
        T: serde::Serialize,
    {
        let Some(value) = value else {
            return self.remove(key).await;
        };

        let token = self.near.try_own(key);
        let wrapped = codec::encode(self.node_id, &value)?;
        let result = self.global.put(key, wrapped).await.map_err(record_global_error);
        if result.is_ok() {
            let plain =
                bincode::serialize(&value).map_err(|e| Error::Serialization(e.to_string()))?;
            self.near.put_if_available(token, key, plain);
        }
        self.near.release_if_owned(token, key);
        result
    }

    /// Conditional write against the authoritative store. On success,
    /// mirrors the outcome into the near-cache; `new` of `None` evicts.
    ///
    /// The old-value check compares decoded values, not wrapper bytes: the
    /// wrapper embeds the writer's NodeId, so a caller comparing against a
    /// value last written by a different node could never supply matching
    /// raw bytes. The CAS sent to the store still uses the exact bytes just
    /// read, so the conditional write itself stays atomic.
    pub async fn replace<T>(&self, key: &str, old: Option<T>, new: Option<T>) -> Result<bool, Error>
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + PartialEq,
    {
        let token = self.near.try_own(key);
        let current_wrapped = self.global.get(key).await.map_err(record_global_error)?;
        let current_value: Option<T> = match &current_wrapped {
            Some(bytes) => {
                let (_, v): (Option<NodeId>, T) = codec::decode(bytes)?;
                Some(v)
            }
            None => None,
        };

        if current_value != old {
            self.near.release_if_owned(token, key);
            return Ok(false);
        }

        let new_wrapped = match &new {
            Some(v) => Some(codec::encode(self.node_id, v)?),
            None => None,
        };

        let applied = self
            .global
            .replace(key, current_wrapped, new_wrapped)
            .await
            .map_err(record_global_error)?;
        if applied {
            match new {
                Some(v) => {
                    let plain = bincode::serialize(&v)
                        .map_err(|e| Error::Serialization(e.to_string()))?;
                    self.near.put_if_available(token, key, plain);
                }
                None => self.near.remove(key),
            }
        }
        self.near.release_if_owned(token, key);
        Ok(applied)
    }

    pub async fn remove(&self, key: &str) -> Result<(), Error> {
        let token = self.near.try_own(key);
        let result = self.global.remove(key).await.map_err(record_global_error);
        self.near.remove(key);
        self.near.release_if_owned(token, key);
        result
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.near.own_all();
        let result = self.global.clear().await.map_err(record_global_error);
        self.near.clear();
        self.near.release_all();
        result
    }
}

struct NearCacheInvalidator {
    near: Arc<NearCache>,
}

#[async_trait]
impl CacheChangeListener for NearCacheInvalidator {
    async fn on_insert(&self, key: &str, _new_value: &[u8]) {
        invalidate(&self.near, key);
    }

    async fn on_update(&self, key: &str, _old_value: Option<&[u8]>, _new_value: &[u8]) {
        invalidate(&self.near, key);
    }

    async fn on_delete(&self, key: &str) {
        invalidate(&self.near, key);
    }
}

fn invalidate(near: &NearCache, key: &str) {
    let token = near.try_own(key);
    near.remove(key);
    near.release_if_owned(token, key);
}
