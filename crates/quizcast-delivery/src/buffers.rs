//! Acknowledgment buffers.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
// `tokio::time::Instant` respects the paused test clock.
use tokio::time::Instant;

use quizcast_protocol::{PlayerId, RoomCode, TaskId};

/// Tuning for buffer expiry.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Age at which an unacknowledged buffer is dropped.
    pub ttl: Duration,

    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// What an acknowledgment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Unknown task, or the player was not pending on it. Repeated acks
    /// land here; they are a no-op, not an error.
    Ignored,

    /// Recorded; others are still pending.
    Recorded { remaining: usize },

    /// That was the last pending recipient. The buffer is gone, and the
    /// original sender can be notified.
    Cleared { sender: PlayerId },
}

struct Buffer {
    room: RoomCode,
    sender: PlayerId,
    event: &'static str,
    pending: HashSet<PlayerId>,
    created_at: Instant,
}

/// All in-flight acknowledgment buffers.
pub struct DeliveryBuffers {
    buffers: Mutex<HashMap<TaskId, Buffer>>,
    next_task: AtomicU64,
    config: DeliveryConfig,
}

impl Default for DeliveryBuffers {
    fn default() -> Self {
        Self::new(DeliveryConfig::default())
    }
}

impl DeliveryBuffers {
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            next_task: AtomicU64::new(1),
            config,
        }
    }

    /// Opens a buffer for a broadcast that reached `recipients`. Returns
    /// `None` when there is no one to wait for, in which case no task id
    /// is spent and nothing is tracked.
    pub fn create(
        &self,
        room: RoomCode,
        sender: PlayerId,
        event: &'static str,
        recipients: impl IntoIterator<Item = PlayerId>,
    ) -> Option<TaskId> {
        let pending: HashSet<PlayerId> = recipients.into_iter().collect();
        if pending.is_empty() {
            return None;
        }
        let task = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        let mut buffers = self.buffers.lock().expect("buffers poisoned");
        tracing::debug!(%task, %room, %sender, event, "delivery buffer opened");
        buffers.insert(
            task,
            Buffer {
                room,
                sender,
                event,
                pending,
                created_at: Instant::now(),
            },
        );
        Some(task)
    }

    /// Records one recipient's acknowledgment.
    pub fn acknowledge(&self, task: TaskId, player: PlayerId) -> AckOutcome {
        let mut buffers = self.buffers.lock().expect("buffers poisoned");
        let Some(buffer) = buffers.get_mut(&task) else {
            return AckOutcome::Ignored;
        };
        if !buffer.pending.remove(&player) {
            return AckOutcome::Ignored;
        }
        let remaining = buffer.pending.len();
        if remaining == 0 {
            let sender = buffer.sender;
            tracing::debug!(%task, room = %buffer.room, %sender, event = buffer.event, "delivery buffer cleared");
            buffers.remove(&task);
            AckOutcome::Cleared { sender }
        } else {
            AckOutcome::Recorded { remaining }
        }
    }

    /// Drops a departed player from every pending set. Buffers they were
    /// the last holdout on clear; the returned pairs let the caller
    /// notify those senders.
    pub fn forget_player(&self, player: PlayerId) -> Vec<(TaskId, PlayerId)> {
        let mut buffers = self.buffers.lock().expect("buffers poisoned");
        let mut cleared = Vec::new();
        buffers.retain(|task, buffer| {
            if buffer.pending.remove(&player) && buffer.pending.is_empty() {
                cleared.push((*task, buffer.sender));
                false
            } else {
                true
            }
        });
        if !cleared.is_empty() {
            tracing::debug!(%player, count = cleared.len(), "buffers cleared by departure");
        }
        cleared
    }

    /// Drops buffers older than the TTL. Returns how many were dropped.
    pub fn expire_stale(&self) -> usize {
        let mut buffers = self.buffers.lock().expect("buffers poisoned");
        let before = buffers.len();
        buffers.retain(|_, b| b.created_at.elapsed() <= self.config.ttl);
        let expired = before - buffers.len();
        if expired > 0 {
            tracing::info!(expired, "stale delivery buffers dropped");
        }
        expired
    }

    /// Number of open buffers.
    pub fn len(&self) -> usize {
        self.buffers.lock().expect("buffers poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns the periodic expiry sweep.
    pub fn spawn_sweep(self: &std::sync::Arc<Self>) -> JoinHandle<()> {
        let buffers = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(buffers.config.sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                buffers.expire_stale();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn code() -> RoomCode {
        RoomCode::parse("ABC234").unwrap()
    }

    fn buffers() -> DeliveryBuffers {
        DeliveryBuffers::new(DeliveryConfig {
            ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_empty_recipient_set_opens_nothing() {
        let buffers = buffers();
        assert_eq!(buffers.create(code(), PlayerId(1), "player:joined", []), None);
        assert!(buffers.is_empty());
    }

    #[tokio::test]
    async fn test_partial_ack_keeps_buffer_pending() {
        let buffers = buffers();
        let task = buffers
            .create(code(), PlayerId(1), "player:joined", [PlayerId(2), PlayerId(3)])
            .unwrap();

        let outcome = buffers.acknowledge(task, PlayerId(2));
        assert_eq!(outcome, AckOutcome::Recorded { remaining: 1 });
        assert_eq!(buffers.len(), 1);
    }

    #[tokio::test]
    async fn test_final_ack_clears_and_names_sender() {
        let buffers = buffers();
        let task = buffers
            .create(code(), PlayerId(1), "player:joined", [PlayerId(2), PlayerId(3)])
            .unwrap();

        buffers.acknowledge(task, PlayerId(2));
        let outcome = buffers.acknowledge(task, PlayerId(3));

        assert_eq!(outcome, AckOutcome::Cleared { sender: PlayerId(1) });
        assert!(buffers.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_and_unknown_acks_ignored() {
        let buffers = buffers();
        let task = buffers
            .create(code(), PlayerId(1), "player:joined", [PlayerId(2), PlayerId(3)])
            .unwrap();

        buffers.acknowledge(task, PlayerId(2));
        assert_eq!(buffers.acknowledge(task, PlayerId(2)), AckOutcome::Ignored);
        assert_eq!(buffers.acknowledge(task, PlayerId(9)), AckOutcome::Ignored);
        assert_eq!(
            buffers.acknowledge(TaskId(999), PlayerId(2)),
            AckOutcome::Ignored
        );
        assert_eq!(buffers.len(), 1, "ignored acks change nothing");
    }

    #[tokio::test]
    async fn test_task_ids_are_unique_and_increasing() {
        let buffers = buffers();
        let a = buffers.create(code(), PlayerId(1), "player:joined", [PlayerId(2)]).unwrap();
        let b = buffers.create(code(), PlayerId(1), "player:joined", [PlayerId(2)]).unwrap();
        assert!(b.0 > a.0);
    }

    #[tokio::test]
    async fn test_forget_player_clears_last_holdout() {
        let buffers = buffers();
        let solo = buffers.create(code(), PlayerId(1), "player:joined", [PlayerId(2)]).unwrap();
        let pair = buffers
            .create(code(), PlayerId(1), "player:joined", [PlayerId(2), PlayerId(3)])
            .unwrap();

        let cleared = buffers.forget_player(PlayerId(2));

        assert_eq!(cleared, vec![(solo, PlayerId(1))]);
        assert_eq!(buffers.len(), 1, "buffer with other holdouts survives");
        assert_eq!(
            buffers.acknowledge(pair, PlayerId(3)),
            AckOutcome::Cleared { sender: PlayerId(1) }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_drops_only_stale_buffers() {
        let buffers = buffers();
        buffers.create(code(), PlayerId(1), "player:joined", [PlayerId(2)]).unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        let young = buffers.create(code(), PlayerId(1), "player:joined", [PlayerId(3)]).unwrap();

        assert_eq!(buffers.expire_stale(), 1);
        assert_eq!(buffers.len(), 1);
        assert!(matches!(
            buffers.acknowledge(young, PlayerId(3)),
            AckOutcome::Cleared { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_expires_buffers() {
        let buffers = Arc::new(DeliveryBuffers::new(DeliveryConfig {
            ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        }));
        buffers.create(code(), PlayerId(1), "player:joined", [PlayerId(2)]).unwrap();

        let sweep = buffers.spawn_sweep();
        tokio::time::advance(Duration::from_secs(16)).await;
        tokio::task::yield_now().await;

        assert!(buffers.is_empty());
        sweep.abort();
    }
}
