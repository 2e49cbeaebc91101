//! Best-effort delivery tracking for room broadcasts.
//!
//! Every broadcast that reached at least one recipient gets a task id
//! and a buffer of who still owes an acknowledgment. When the last
//! recipient acks, the buffer clears and the original sender can be
//! told their event landed everywhere. There is no redelivery: a
//! recipient that never acks is handled by the TTL sweep, not by
//! retransmission.

mod buffers;

pub use buffers::{AckOutcome, DeliveryBuffers, DeliveryConfig};
