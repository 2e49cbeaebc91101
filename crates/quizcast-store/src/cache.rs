//! Read-through/write-through cache over a [`Store`].
//!
//! The cache is never authoritative: every miss consults the store, and
//! every write goes through the store first. Freshness comes from two
//! sides — the store's change feed pushes committed documents in, and a
//! periodic sweep evicts anything older than the TTL as a safety net
//! against a missed or disconnected feed.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
// `tokio::time::Instant` respects the paused test clock, unlike std's.
use tokio::time::Instant;
use tokio::task::JoinHandle;

use crate::{ChangeKind, Store, StoreError, TxError};

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age of a cache entry before the sweep evicts it.
    pub ttl: Duration,

    /// How often the eviction sweep runs.
    pub sweep_interval: Duration,

    /// Delay before re-subscribing after the change feed drops.
    pub resubscribe_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
            resubscribe_delay: Duration::from_secs(1),
        }
    }
}

struct Entry<V> {
    value: V,
    refreshed_at: Instant,
}

/// A cache over store `S`, keyed like the store itself.
pub struct Cache<K, V, S> {
    store: Arc<S>,
    entries: StdMutex<HashMap<K, Entry<V>>>,
    config: CacheConfig,
}

impl<K, V, S> Cache<K, V, S>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: Store<K, V>,
{
    /// Wraps a store with an empty cache.
    pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
        Self {
            store,
            entries: StdMutex::new(HashMap::new()),
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Number of cached entries.
    pub fn cached_len(&self) -> usize {
        self.entries.lock().expect("cache poisoned").len()
    }

    fn cache_put(&self, key: K, value: V) {
        self.entries.lock().expect("cache poisoned").insert(
            key,
            Entry {
                value,
                refreshed_at: Instant::now(),
            },
        );
    }

    fn cache_evict(&self, key: &K) {
        self.entries.lock().expect("cache poisoned").remove(key);
    }

    fn cache_get_fresh(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().expect("cache poisoned");
        let entry = entries.get(key)?;
        if entry.refreshed_at.elapsed() > self.config.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Returns the document, from cache when fresh, otherwise from the
    /// store (populating the cache on the way out).
    pub async fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        if let Some(value) = self.cache_get_fresh(key) {
            return Ok(Some(value));
        }
        match self.store.load(key).await? {
            Some(value) => {
                self.cache_put(key.clone(), value.clone());
                Ok(Some(value))
            }
            None => {
                self.cache_evict(key);
                Ok(None)
            }
        }
    }

    /// Probes the store for existence. Bypasses the cache so allocator
    /// probes always see the durable truth.
    pub async fn exists(&self, key: &K) -> Result<bool, StoreError> {
        self.store.exists(key).await
    }

    /// Inserts a new document through the store, then caches it.
    pub async fn insert(&self, key: K, value: V) -> Result<(), StoreError> {
        self.store.insert(key.clone(), value.clone()).await?;
        self.cache_put(key, value);
        Ok(())
    }

    /// Runs a transactional mutation through the store and refreshes the
    /// cache entry from the committed result.
    pub async fn update<T, E, F>(&self, key: &K, mutate: F) -> Result<(V, T), TxError<E>>
    where
        F: FnOnce(&mut V) -> Result<T, E> + Send,
        T: Send,
        E: Send,
    {
        let (committed, output) = self.store.update(key, mutate).await?;
        self.cache_put(key.clone(), committed.clone());
        Ok((committed, output))
    }

    /// Removes the document from the store and evicts it from the cache.
    pub async fn remove(&self, key: &K) -> Result<bool, StoreError> {
        let removed = self.store.remove(key).await?;
        self.cache_evict(key);
        Ok(removed)
    }

    /// Spawns the feed listener and eviction sweep. Returns the handles
    /// so a server can abort them on shutdown.
    pub fn spawn_maintenance(self: &Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let feed = tokio::spawn(Arc::clone(self).run_feed());
        let sweep = tokio::spawn(Arc::clone(self).run_sweep());
        (feed, sweep)
    }

    /// Applies the store's change feed to the cache, forever.
    ///
    /// On lag the missed entries are left to the TTL sweep; on a closed
    /// feed the listener re-subscribes after a fixed delay.
    pub async fn run_feed(self: Arc<Self>) {
        loop {
            let mut feed = self.store.subscribe();
            tracing::debug!("cache subscribed to change feed");
            loop {
                match feed.recv().await {
                    Ok(change) => match change.kind {
                        ChangeKind::Upserted => {
                            if let Some(value) = change.value {
                                self.cache_put(change.key, value);
                            }
                        }
                        ChangeKind::Removed => {
                            self.cache_evict(&change.key);
                        }
                    },
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            missed,
                            "change feed lagged; stale entries expire via TTL"
                        );
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("change feed closed; re-subscribing");
                        break;
                    }
                }
            }
            tokio::time::sleep(self.config.resubscribe_delay).await;
        }
    }

    /// Periodically evicts entries older than the TTL.
    pub async fn run_sweep(self: Arc<Self>) {
        let mut tick = tokio::time::interval(self.config.sweep_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let evicted = {
                let mut entries = self.entries.lock().expect("cache poisoned");
                let before = entries.len();
                entries.retain(|_, e| e.refreshed_at.elapsed() <= self.config.ttl);
                before - entries.len()
            };
            if evicted > 0 {
                tracing::debug!(evicted, "cache sweep evicted stale entries");
            }
        }
    }
}
