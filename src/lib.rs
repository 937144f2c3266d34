//! A tiered distributed cache: a per-process near-cache layered over a
//! shared authoritative store, kept coherent by a change-feed consumer.
//!
//! The [`slot_table`] module is the heart of the design — a lock-free
//! coordination protocol that prevents stale values from being admitted
//! into the near-cache when a concurrent invalidation races a miss-fetch.
//! Everything else in this crate exists to put that protocol to work.

pub mod change_feed;
pub mod codec;
pub mod config;
pub mod error;
pub mod global_store;
pub mod listeners;
pub mod local_store;
pub mod metrics;
pub mod near_cache;
pub mod node_id;
pub mod slot_table;
pub mod tiered_cache;

pub use config::Config;
pub use error::Error;
pub use node_id::NodeId;
pub use tiered_cache::{CacheType, ConsistencyModel, TieredCache};
