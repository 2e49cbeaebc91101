//! In-process store implementation.
//!
//! Each document gets its own async mutex, so transactions against one
//! key queue up while unrelated keys stay fully parallel. The outer map
//! is guarded by a `std::sync::Mutex` that is never held across an
//! `.await`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, broadcast};

use crate::{Change, ChangeKind, Store, StoreError, TxError};

/// Change-feed buffer size. Slow subscribers past this lag and must
/// resubscribe; the store itself never blocks on the feed.
const FEED_CAPACITY: usize = 256;

/// An in-memory [`Store`] with per-key transaction serialization and a
/// broadcast change feed.
pub struct MemoryStore<K, V> {
    slots: StdMutex<HashMap<K, Arc<AsyncMutex<V>>>>,
    feed: broadcast::Sender<Change<K, V>>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty store.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            slots: StdMutex::new(HashMap::new()),
            feed,
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("slot map poisoned").len()
    }

    /// Returns `true` if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &K) -> Option<Arc<AsyncMutex<V>>> {
        self.slots
            .lock()
            .expect("slot map poisoned")
            .get(key)
            .cloned()
    }

    fn publish(&self, key: K, kind: ChangeKind, value: Option<V>) {
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.feed.send(Change { key, kind, value });
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn load(&self, key: &K) -> Result<Option<V>, StoreError> {
        match self.slot(key) {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn insert(&self, key: K, value: V) -> Result<(), StoreError> {
        {
            let mut slots = self.slots.lock().expect("slot map poisoned");
            if slots.contains_key(&key) {
                return Err(StoreError::Duplicate);
            }
            slots.insert(key.clone(), Arc::new(AsyncMutex::new(value.clone())));
        }
        self.publish(key, ChangeKind::Upserted, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &K) -> Result<bool, StoreError> {
        let removed = self
            .slots
            .lock()
            .expect("slot map poisoned")
            .remove(key)
            .is_some();
        if removed {
            self.publish(key.clone(), ChangeKind::Removed, None);
        }
        Ok(removed)
    }

    async fn update<T, E, F>(&self, key: &K, mutate: F) -> Result<(V, T), TxError<E>>
    where
        F: FnOnce(&mut V) -> Result<T, E> + Send,
        T: Send,
        E: Send,
    {
        let slot = self.slot(key).ok_or(StoreError::NotFound)?;
        let mut guard = slot.lock().await;

        // The document may have been removed between the map lookup and
        // acquiring its lock; committing into an orphaned slot would
        // resurrect it, so abort instead.
        let still_current = self
            .slots
            .lock()
            .expect("slot map poisoned")
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        if !still_current {
            return Err(StoreError::TransactionAborted(
                "document removed mid-transaction".into(),
            )
            .into());
        }

        let mut draft = guard.clone();
        let output = mutate(&mut draft).map_err(TxError::App)?;
        *guard = draft.clone();
        drop(guard);

        self.publish(key.clone(), ChangeKind::Upserted, Some(draft.clone()));
        Ok((draft, output))
    }

    fn subscribe(&self) -> broadcast::Receiver<Change<K, V>> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_then_load_round_trips() {
        let store = MemoryStore::new();
        store.insert("a", 1u32).await.unwrap();
        assert_eq!(store.load(&"a").await.unwrap(), Some(1));
        assert_eq!(store.load(&"b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_duplicate_key_fails() {
        let store = MemoryStore::new();
        store.insert("a", 1u32).await.unwrap();
        assert_eq!(
            store.insert("a", 2u32).await,
            Err(StoreError::Duplicate)
        );
        // Original document untouched.
        assert_eq!(store.load(&"a").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_update_commits_mutation() {
        let store = MemoryStore::new();
        store.insert("a", 1u32).await.unwrap();

        let (committed, output) = store
            .update::<_, (), _>(&"a", |v| {
                *v += 10;
                Ok(*v)
            })
            .await
            .unwrap();

        assert_eq!(committed, 11);
        assert_eq!(output, 11);
        assert_eq!(store.load(&"a").await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_mutation_error() {
        let store = MemoryStore::new();
        store.insert("a", 1u32).await.unwrap();

        let result = store
            .update::<u32, &str, _>(&"a", |v| {
                *v = 999;
                Err("rejected")
            })
            .await;

        assert!(matches!(result, Err(TxError::App("rejected"))));
        assert_eq!(store.load(&"a").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_update_unknown_key_is_not_found() {
        let store: MemoryStore<&str, u32> = MemoryStore::new();
        let result = store.update::<(), (), _>(&"nope", |_| Ok(())).await;
        assert!(matches!(
            result,
            Err(TxError::Store(StoreError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_one_key_lose_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.insert("counter", 0u32).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update::<_, (), _>(&"counter", |v| {
                        *v += 1;
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.load(&"counter").await.unwrap(), Some(50));
    }

    #[tokio::test]
    async fn test_feed_publishes_commits_in_order() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe();

        store.insert("a", 1u32).await.unwrap();
        store
            .update::<_, (), _>(&"a", |v| {
                *v = 2;
                Ok(())
            })
            .await
            .unwrap();
        store.remove(&"a").await.unwrap();

        let first = feed.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Upserted);
        assert_eq!(first.value, Some(1));

        let second = feed.recv().await.unwrap();
        assert_eq!(second.kind, ChangeKind::Upserted);
        assert_eq!(second.value, Some(2));

        let third = feed.recv().await.unwrap();
        assert_eq!(third.kind, ChangeKind::Removed);
        assert_eq!(third.value, None);
    }

    #[tokio::test]
    async fn test_remove_then_update_is_not_found() {
        let store = MemoryStore::new();
        store.insert("a", 1u32).await.unwrap();
        assert!(store.remove(&"a").await.unwrap());
        assert!(!store.remove(&"a").await.unwrap());

        let result = store.update::<(), (), _>(&"a", |_| Ok(())).await;
        assert!(matches!(
            result,
            Err(TxError::Store(StoreError::NotFound))
        ));
    }
}
