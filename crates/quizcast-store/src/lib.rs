//! Storage layer for Quizcast.
//!
//! The durable store is a black-box dependency: the rest of the system
//! only relies on the [`Store`] trait — per-document transactions and a
//! change feed — never on a concrete backend.
//!
//! # Key pieces
//!
//! - [`Store`] — the durable-store contract: load/insert/remove, a
//!   transactional `update`, and a broadcast change feed
//! - [`MemoryStore`] — in-process implementation with per-key locks, so
//!   transactions on the *same* document serialize while different
//!   documents proceed in parallel
//! - [`Cache`] — read-through/write-through cache over a store, kept
//!   fresh by the change feed plus a TTL sweep; the store stays
//!   authoritative and every miss consults it

mod cache;
mod error;
mod memory;
mod store;

pub use cache::{Cache, CacheConfig};
pub use error::{StoreError, TxError};
pub use memory::MemoryStore;
pub use store::{Change, ChangeKind, Store};
