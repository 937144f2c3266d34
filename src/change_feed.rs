//! Background consumer that drains the authoritative store's change stream
//! and fans out invalidations to every near-cache entry it affects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::global_store::{EventKind, GlobalStoreClient, ShardIteratorKind};
use crate::listeners::ListenerRegistry;
use crate::metrics::METRICS;
use crate::node_id::NodeId;

/// Polls the change stream on an interval and dispatches invalidations.
/// Started at construction of [`crate::tiered_cache::TieredCache`]; call
/// [`Self::shutdown`] to stop it and release the backend client.
pub struct ChangeFeedConsumer {
    cancellation: CancellationToken,
}

/// Resets the single-flight flag on drop, so a panicking tick still clears
/// it instead of wedging the consumer permanently.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChangeFeedConsumer {
    pub fn spawn(
        store: Arc<dyn GlobalStoreClient>,
        listeners: Arc<ListenerRegistry>,
        node_id: NodeId,
        poll_interval: Duration,
    ) -> Self {
        let cancellation = CancellationToken::new();
        let task_cancellation = cancellation.clone();
        let in_flight = Arc::new(AtomicBool::new(false));
        let cursors: Arc<RwLock<HashMap<String, String>>> = Arc::new(RwLock::new(HashMap::new()));
        let seen_any_tick = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = task_cancellation.cancelled() => break,
                    _ = interval.tick() => {
                        if in_flight.swap(true, Ordering::SeqCst) {
                            // prior tick still running; skip this one
                            continue;
                        }
                        let first_tick = !seen_any_tick.swap(true, Ordering::SeqCst);

                        // Run the tick on its own task so a panic (e.g. a
                        // poisoned-lock unwrap in a store implementation, or a
                        // panicking listener) can't take the whole consumer
                        // loop down with it; the guard still resets in_flight
                        // during that task's unwind.
                        let store = store.clone();
                        let listeners = listeners.clone();
                        let cursors = cursors.clone();
                        let guard_flag = in_flight.clone();
                        let tick_result = tokio::spawn(async move {
                            let _guard = InFlightGuard(guard_flag);
                            tick(store.as_ref(), listeners.as_ref(), node_id, &cursors, first_tick).await
                        }).await;

                        match tick_result {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                METRICS.change_feed_tick_errors.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(error = %e, "change feed tick failed");
                            }
                            Err(join_err) => {
                                METRICS.change_feed_tick_errors.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(error = %join_err, "change feed tick panicked");
                            }
                        }
                    }
                }
            }
        });

        Self { cancellation }
    }

    /// Cancel the background task. Idempotent.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }
}

impl Drop for ChangeFeedConsumer {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn tick(
    store: &dyn GlobalStoreClient,
    listeners: &ListenerRegistry,
    node_id: NodeId,
    cursors: &RwLock<HashMap<String, String>>,
    first_tick: bool,
) -> Result<(), crate::Error> {
    let shard_ids = store.list_shards().await?;

    for shard_id in shard_ids {
        let cursor = {
            let existing = cursors.read().await.get(&shard_id).cloned();
            match existing {
                Some(c) => c,
                None => {
                    // first-ever tick: skip history on newly discovered shards too,
                    // since there is by definition no prior state to catch up on.
                    // a shard discovered on a later tick uses trim-horizon so no
                    // records are missed between table creation and discovery.
                    let kind = if first_tick {
                        ShardIteratorKind::Latest
                    } else {
                        ShardIteratorKind::TrimHorizon
                    };
                    let iterator = store.shard_iterator(&shard_id, kind).await?;
                    cursors.write().await.insert(shard_id.clone(), iterator.clone());
                    iterator
                }
            }
        };

        let mut cursor = cursor;
        loop {
            let batch = store.get_records(&cursor).await?;
            if batch.records.is_empty() {
                if let Some(next) = batch.next_cursor {
                    cursors.write().await.insert(shard_id.clone(), next);
                }
                break;
            }

            for record in &batch.records {
                METRICS.change_feed_records.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = dispatch(listeners, node_id, record).await {
                    tracing::warn!(error = %e, key = %record.key, "failed to decode change record");
                }
            }

            match batch.next_cursor {
                Some(next) => {
                    cursors.write().await.insert(shard_id.clone(), next.clone());
                    cursor = next;
                }
                None => break,
            }
        }
    }

    Ok(())
}

async fn dispatch(
    listeners: &ListenerRegistry,
    node_id: NodeId,
    record: &crate::global_store::ChangeRecord,
) -> Result<(), crate::Error> {
    match record.event_kind {
        EventKind::Insert => {
            let Some(new_image) = &record.new_image else {
                return Ok(());
            };
            let (origin, ()) = decode_marker(new_image)?;
            if origin != Some(node_id) {
                METRICS.change_feed_invalidations.fetch_add(1, Ordering::Relaxed);
                for listener in listeners.snapshot().iter() {
                    listener.on_insert(&record.key, new_image).await;
                }
            } else {
                METRICS.change_feed_self_echoes.fetch_add(1, Ordering::Relaxed);
            }
        }
        EventKind::Modify => {
            let Some(new_image) = &record.new_image else {
                return Ok(());
            };
            let (origin, ()) = decode_marker(new_image)?;
            if origin != Some(node_id) {
                METRICS.change_feed_invalidations.fetch_add(1, Ordering::Relaxed);
                for listener in listeners.snapshot().iter() {
                    listener
                        .on_update(&record.key, record.old_image.as_deref(), new_image)
                        .await;
                }
            } else {
                METRICS.change_feed_self_echoes.fetch_add(1, Ordering::Relaxed);
            }
        }
        EventKind::Remove => {
            // Remove records carry no image, so there is no sourceId to check.
            // A node's own deletes are echoed back and re-invalidate locally —
            // a harmless no-op eviction of an already-absent key.
            METRICS.change_feed_invalidations.fetch_add(1, Ordering::Relaxed);
            for listener in listeners.snapshot().iter() {
                listener.on_delete(&record.key).await;
            }
        }
    }
    Ok(())
}

/// Decode only the source id out of a wrapper, ignoring the payload — the
/// change feed never needs the decoded value, only who wrote it.
fn decode_marker(wrapped: &[u8]) -> Result<(Option<NodeId>, ()), crate::Error> {
    Ok((codec::decode_source_id(wrapped)?, ()))
}
