//! Contract for the authoritative remote store and its change stream.

pub mod memory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Kind of mutation carried by a change-feed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Insert,
    Modify,
    Remove,
}

/// A single change-feed record. `old_image`/`new_image` carry the raw
/// wrapper bytes as stored in the global store (still wrapped — the
/// consumer decodes them).
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub event_kind: EventKind,
    pub key: String,
    pub old_image: Option<Vec<u8>>,
    pub new_image: Option<Vec<u8>>,
}

/// One shard's worth of drained records plus its advanced cursor.
#[derive(Debug, Clone)]
pub struct ShardBatch {
    pub records: Vec<ChangeRecord>,
    pub next_cursor: Option<String>,
}

/// Where to start reading a newly discovered shard from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardIteratorKind {
    /// Skip all history; only records produced after this point are seen.
    Latest,
    /// Read from the earliest available record.
    TrimHorizon,
}

/// Thin async contract over the authoritative KV store and its change
/// stream. `get`/`replace` are strongly consistent; the change stream is
/// the only channel through which other nodes observe mutations.
#[async_trait]
pub trait GlobalStoreClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;
    async fn put(&self, key: &str, wrapped_bytes: Vec<u8>) -> Result<(), Error>;
    async fn remove(&self, key: &str) -> Result<(), Error>;
    /// Conditional write: succeeds only if the stored bytes equal `old`
    /// (`None` meaning absent). Returns whether the write took effect.
    async fn replace(
        &self,
        key: &str,
        old: Option<Vec<u8>>,
        new: Option<Vec<u8>>,
    ) -> Result<bool, Error>;
    async fn clear(&self) -> Result<(), Error>;

    /// Current shard identifiers for the change stream.
    async fn list_shards(&self) -> Result<Vec<String>, Error>;

    /// Obtain a cursor for `shard_id` per the given iterator policy.
    async fn shard_iterator(
        &self,
        shard_id: &str,
        kind: ShardIteratorKind,
    ) -> Result<String, Error>;

    /// Drain one batch of records from `cursor`.
    async fn get_records(&self, cursor: &str) -> Result<ShardBatch, Error>;
}
