//! The durable-store contract.

use std::fmt;
use std::future::Future;
use std::hash::Hash;

use tokio::sync::broadcast;

use crate::{StoreError, TxError};

/// One entry on the change feed.
#[derive(Debug, Clone)]
pub struct Change<K, V> {
    pub key: K,
    pub kind: ChangeKind,
    /// The committed document for upserts, `None` for removals.
    pub value: Option<V>,
}

/// What happened to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Upserted,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upserted => write!(f, "upserted"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// A keyed document store with per-document transactions and a change
/// feed.
///
/// Implementations must serialize concurrent `update` calls against the
/// same key (mutations commit one at a time, no lost updates) while
/// keeping different keys fully independent.
///
/// Methods are declared as `impl Future + Send` rather than `async fn`
/// so callers generic over a store can spawn their futures onto the
/// runtime; implementations still write plain `async fn`.
pub trait Store<K, V>: Send + Sync + 'static
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Loads the current committed document, if any.
    fn load(&self, key: &K) -> impl Future<Output = Result<Option<V>, StoreError>> + Send;

    /// Returns `true` if a document exists under `key`.
    fn exists(&self, key: &K) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async { Ok(self.load(key).await?.is_some()) }
    }

    /// Inserts a new document. Fails with [`StoreError::Duplicate`] if the
    /// key is already present — this is the uniqueness constraint callers
    /// rely on after probing for a free key.
    fn insert(&self, key: K, value: V) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes a document. Returns `true` if one existed.
    fn remove(&self, key: &K) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Runs `mutate` inside a transaction scoped to `key` and returns the
    /// committed document together with the mutation's output.
    ///
    /// If `mutate` returns `Err`, nothing commits and the error surfaces
    /// as [`TxError::App`]. Store-side failures (missing document,
    /// aborted transaction) surface as [`TxError::Store`].
    fn update<T, E, F>(
        &self,
        key: &K,
        mutate: F,
    ) -> impl Future<Output = Result<(V, T), TxError<E>>> + Send
    where
        F: FnOnce(&mut V) -> Result<T, E> + Send,
        T: Send,
        E: Send;

    /// Subscribes to the change feed. Every committed insert, update, and
    /// remove is published, in commit order per key.
    fn subscribe(&self) -> broadcast::Receiver<Change<K, V>>;
}
