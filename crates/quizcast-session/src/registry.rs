//! Live-connection registry.
//!
//! One entry per authenticated socket: the outbound channel its writer
//! task drains, and the room the connection is currently in. All methods
//! take `&self`; the inner map sits behind a plain mutex that is never
//! held across an await.

use std::collections::HashMap;
use std::sync::Mutex;

use quizcast_protocol::{PlayerId, RoomCode, ServerEvent};
use tokio::sync::mpsc;

use crate::SessionError;

/// Outbound half of a connection: the writer task owns the receiver.
pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;

struct Peer {
    sender: OutboundSender,
    room: Option<RoomCode>,
}

/// All currently connected players.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<PlayerId, Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an authenticated connection. A player reconnecting
    /// while an old socket lingers displaces it: the previous sender is
    /// returned so the caller can shut that connection down. The room
    /// binding survives the swap, since the player never left the room,
    /// only the socket.
    pub fn register(&self, player: PlayerId, sender: OutboundSender) -> Option<OutboundSender> {
        let mut peers = self.peers.lock().expect("registry poisoned");
        match peers.get_mut(&player) {
            Some(peer) => {
                tracing::info!(%player, "existing connection displaced by new login");
                Some(std::mem::replace(&mut peer.sender, sender))
            }
            None => {
                peers.insert(player, Peer { sender, room: None });
                None
            }
        }
    }

    /// Drops the connection's entry, returning the room it was bound to
    /// (`Some(room_binding)`) so the caller can run the implicit leave.
    /// The entry is removed only while it still holds this connection's
    /// channel; a socket that was displaced by a newer login gets `None`
    /// and the live session stays untouched.
    pub fn unregister(
        &self,
        player: PlayerId,
        sender: &OutboundSender,
    ) -> Option<Option<RoomCode>> {
        let mut peers = self.peers.lock().expect("registry poisoned");
        match peers.get(&player) {
            Some(peer) if peer.sender.same_channel(sender) => {
                peers.remove(&player).map(|p| p.room)
            }
            Some(_) => {
                tracing::debug!(%player, "close of displaced connection ignored");
                None
            }
            None => None,
        }
    }

    /// Records which room the player's connection is in.
    pub fn bind_room(&self, player: PlayerId, code: RoomCode) -> Result<(), SessionError> {
        let mut peers = self.peers.lock().expect("registry poisoned");
        let peer = peers
            .get_mut(&player)
            .ok_or(SessionError::NotConnected(player))?;
        peer.room = Some(code);
        Ok(())
    }

    /// Clears the player's room binding, returning the old one.
    pub fn unbind_room(&self, player: PlayerId) -> Option<RoomCode> {
        let mut peers = self.peers.lock().expect("registry poisoned");
        peers.get_mut(&player).and_then(|p| p.room.take())
    }

    /// The room the player's connection is bound to, if any.
    pub fn room_of(&self, player: PlayerId) -> Option<RoomCode> {
        let peers = self.peers.lock().expect("registry poisoned");
        peers.get(&player).and_then(|p| p.room.clone())
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.peers.lock().expect("registry poisoned").contains_key(&player)
    }

    pub fn connected_count(&self) -> usize {
        self.peers.lock().expect("registry poisoned").len()
    }

    /// Queues an event to one player. Returns `false` when the player is
    /// not connected or their writer has gone away (the dead entry is
    /// pruned).
    pub fn send_to(&self, player: PlayerId, event: ServerEvent) -> bool {
        let mut peers = self.peers.lock().expect("registry poisoned");
        match peers.get(&player) {
            Some(peer) => {
                if peer.sender.send(event).is_ok() {
                    true
                } else {
                    tracing::debug!(%player, "outbound channel closed; pruning peer");
                    peers.remove(&player);
                    false
                }
            }
            None => false,
        }
    }

    /// Queues an event to every listed player, returning the ones that
    /// were actually reached. The caller uses that set to decide who
    /// owes an acknowledgment.
    pub fn broadcast(
        &self,
        players: impl IntoIterator<Item = PlayerId>,
        event: &ServerEvent,
    ) -> Vec<PlayerId> {
        players
            .into_iter()
            .filter(|&player| self.send_to(player, event.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (OutboundSender, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    fn code() -> RoomCode {
        RoomCode::parse("ABC234").unwrap()
    }

    fn ping() -> ServerEvent {
        ServerEvent::AuthOk {
            player_id: PlayerId(1),
        }
    }

    #[test]
    fn test_register_and_send() {
        let registry = PeerRegistry::new();
        let (tx, mut rx) = channel();
        registry.register(PlayerId(1), tx);

        assert!(registry.send_to(PlayerId(1), ping()));
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::AuthOk { .. })));
    }

    #[test]
    fn test_reregister_displaces_old_sender() {
        let registry = PeerRegistry::new();
        let (old_tx, _old_rx) = channel();
        let (new_tx, mut new_rx) = channel();

        assert!(registry.register(PlayerId(1), old_tx).is_none());
        let displaced = registry.register(PlayerId(1), new_tx);
        assert!(displaced.is_some());

        registry.send_to(PlayerId(1), ping());
        assert!(matches!(new_rx.try_recv(), Ok(ServerEvent::AuthOk { .. })));
    }

    #[test]
    fn test_send_to_dead_channel_prunes_entry() {
        let registry = PeerRegistry::new();
        let (tx, rx) = channel();
        registry.register(PlayerId(1), tx);
        drop(rx);

        assert!(!registry.send_to(PlayerId(1), ping()));
        assert!(!registry.is_connected(PlayerId(1)));
    }

    #[test]
    fn test_room_binding_round_trip() {
        let registry = PeerRegistry::new();
        let (tx, _rx) = channel();
        registry.register(PlayerId(1), tx);

        registry.bind_room(PlayerId(1), code()).unwrap();
        assert_eq!(registry.room_of(PlayerId(1)), Some(code()));
        assert_eq!(registry.unbind_room(PlayerId(1)), Some(code()));
        assert_eq!(registry.room_of(PlayerId(1)), None);
    }

    #[test]
    fn test_bind_room_requires_connection() {
        let registry = PeerRegistry::new();
        assert_eq!(
            registry.bind_room(PlayerId(9), code()),
            Err(SessionError::NotConnected(PlayerId(9)))
        );
    }

    #[test]
    fn test_unregister_returns_room_binding() {
        let registry = PeerRegistry::new();
        let (tx, _rx) = channel();
        registry.register(PlayerId(1), tx.clone());
        registry.bind_room(PlayerId(1), code()).unwrap();

        assert_eq!(registry.unregister(PlayerId(1), &tx), Some(Some(code())));
        assert!(!registry.is_connected(PlayerId(1)));
    }

    #[test]
    fn test_reregister_keeps_room_binding() {
        let registry = PeerRegistry::new();
        let (old_tx, _old_rx) = channel();
        let (new_tx, _new_rx) = channel();
        registry.register(PlayerId(1), old_tx);
        registry.bind_room(PlayerId(1), code()).unwrap();

        registry.register(PlayerId(1), new_tx);

        assert_eq!(registry.room_of(PlayerId(1)), Some(code()));
    }

    #[test]
    fn test_displaced_channel_cannot_unregister_live_session() {
        let registry = PeerRegistry::new();
        let (old_tx, _old_rx) = channel();
        let (new_tx, mut new_rx) = channel();
        registry.register(PlayerId(1), old_tx.clone());
        registry.bind_room(PlayerId(1), code()).unwrap();
        registry.register(PlayerId(1), new_tx.clone());

        // The old socket closing must not tear down the new session.
        assert_eq!(registry.unregister(PlayerId(1), &old_tx), None);
        assert!(registry.is_connected(PlayerId(1)));
        assert_eq!(registry.room_of(PlayerId(1)), Some(code()));
        assert!(registry.send_to(PlayerId(1), ping()));
        assert!(new_rx.try_recv().is_ok());

        // The current socket still can.
        assert_eq!(registry.unregister(PlayerId(1), &new_tx), Some(Some(code())));
        assert!(!registry.is_connected(PlayerId(1)));
    }

    #[test]
    fn test_broadcast_reports_reached_players() {
        let registry = PeerRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, rx2) = channel();
        registry.register(PlayerId(1), tx1);
        registry.register(PlayerId(2), tx2);
        drop(rx2);

        let reached = registry.broadcast(
            [PlayerId(1), PlayerId(2), PlayerId(3)],
            &ping(),
        );

        assert_eq!(reached, vec![PlayerId(1)]);
        assert!(rx1.try_recv().is_ok());
    }
}
