//! Change-listener registry: an immutable snapshot swapped on register so
//! dispatch can iterate lock-free.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

/// Callback invoked by the change feed when a remote mutation is observed.
#[async_trait]
pub trait CacheChangeListener: Send + Sync {
    async fn on_insert(&self, key: &str, new_value: &[u8]);
    async fn on_update(&self, key: &str, old_value: Option<&[u8]>, new_value: &[u8]);
    async fn on_delete(&self, key: &str);
}

pub struct ListenerRegistry {
    listeners: ArcSwap<Vec<Arc<dyn CacheChangeListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn register(&self, listener: Arc<dyn CacheChangeListener>) {
        self.listeners.rcu(|current| {
            let mut next = (**current).clone();
            next.push(listener.clone());
            next
        });
    }

    /// Lock-free snapshot of the current listener set.
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn CacheChangeListener>>> {
        self.listeners.load_full()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl CacheChangeListener for CountingListener {
        async fn on_insert(&self, _key: &str, _new_value: &[u8]) {
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
        async fn on_update(&self, _key: &str, _old_value: Option<&[u8]>, _new_value: &[u8]) {}
        async fn on_delete(&self, _key: &str) {}
    }

    #[tokio::test]
    async fn registered_listener_receives_dispatch() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(CountingListener {
            inserts: AtomicUsize::new(0),
        });
        registry.register(listener.clone());

        for l in registry.snapshot().iter() {
            l.on_insert("k", b"v").await;
        }

        assert_eq!(listener.inserts.load(Ordering::Relaxed), 1);
    }
}
