//! Error types for the storage layer.

/// Errors reported by a [`Store`](crate::Store) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No document exists under the given key.
    #[error("document not found")]
    NotFound,

    /// An insert hit an existing key. This is the uniqueness constraint
    /// that closes the allocator's check-then-create window.
    #[error("document already exists")]
    Duplicate,

    /// The store aborted the transaction; the mutation did not commit.
    /// Callers decide whether to retry.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

/// Outcome of a transactional update: either the store failed, or the
/// caller's mutation rejected the document and nothing was committed.
#[derive(Debug, thiserror::Error)]
pub enum TxError<E> {
    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    App(E),
}

impl<E> From<StoreError> for TxError<E> {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
