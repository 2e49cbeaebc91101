//! Event dispatch: one authenticated client event in, one [`Reply`] out,
//! plus whatever room broadcasts the event caused.
//!
//! Broadcasts to other members are tracked: each one that reaches at
//! least one connected recipient opens a delivery buffer, and the task
//! id rides on the event so recipients can acknowledge it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use quizcast_delivery::AckOutcome;
use quizcast_protocol::{
    ClientEvent, ErrorCode, PlayerId, RemovalReason, Reply, RoomCode, ServerEvent, TaskId,
};
use quizcast_room::{NewPlayer, QuestionCatalog, Room};
use quizcast_session::{Authenticator, Identity, OutboundSender};
use quizcast_store::Store;

use crate::error::reply_for;
use crate::server::GatewayState;

/// Serializes a reply payload. Our own types always serialize; a failure
/// here is a bug worth logging, not worth crashing a connection over.
fn ok_json<T: Serialize>(value: &T) -> Reply {
    match serde_json::to_value(value) {
        Ok(v) => Reply::ok(v),
        Err(e) => {
            tracing::error!(error = %e, "reply payload serialization failed");
            Reply::err(ErrorCode::Internal, "internal error")
        }
    }
}

/// Routes one post-auth client event. Always produces a reply.
pub(crate) async fn dispatch<S, C, A>(
    state: &Arc<GatewayState<S, C, A>>,
    identity: &Identity,
    event: ClientEvent,
) -> Reply
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    let me = identity.player_id;
    match event {
        ClientEvent::Auth { .. } => {
            Reply::err(ErrorCode::Validation, "already authenticated")
        }

        ClientEvent::RoomJoin {
            room_code,
            player_name,
            is_host,
            settings,
        } => {
            if state.registry.room_of(me).is_some() {
                return Reply::err(ErrorCode::Conflict, "already in a room");
            }
            let profile = NewPlayer {
                id: me,
                name: player_name.unwrap_or_else(|| identity.display_name.clone()),
                avatar: identity.avatar.clone(),
            };

            let result = match (is_host, room_code) {
                (false, Some(code)) => state.lifecycle.join(&code, profile).await,
                _ => state.lifecycle.create_room(profile, settings).await,
            };
            let snap = match result {
                Ok(snap) => snap,
                Err(e) => return reply_for(&e),
            };
            if let Err(e) = state.registry.bind_room(me, snap.code.clone()) {
                tracing::debug!(player = %me, error = %e, "room bind after join failed");
            }

            if let Some(player) = snap
                .players
                .iter()
                .find(|p| p.player_id == me)
                .cloned()
            {
                broadcast_tracked(
                    state,
                    snap.code.clone(),
                    me,
                    snap.players.iter().map(|p| p.player_id),
                    ServerEvent::PlayerJoined {
                        room: snap.clone(),
                        player,
                        task_id: None,
                        sender_id: me,
                    },
                );
            }
            ok_json(&snap)
        }

        ClientEvent::RoomLeave {} => {
            let Some(code) = state.registry.room_of(me) else {
                return Reply::err(ErrorCode::State, "not in a room");
            };
            match state.lifecycle.leave(&code, me).await {
                Ok((removal, snap)) => {
                    // Unbind only once the room document has let go of
                    // the player; a failed leave keeps the binding so a
                    // retry can still find the room.
                    state.registry.unbind_room(me);
                    broadcast_tracked(
                        state,
                        code.clone(),
                        me,
                        snap.players.iter().map(|p| p.player_id),
                        ServerEvent::PlayerRemoved {
                            room_code: code,
                            player_id: me,
                            reason: RemovalReason::Left,
                            new_host: removal.new_host,
                            room_finished: removal.finished,
                            task_id: None,
                            sender_id: me,
                        },
                    );
                    Reply::ok_empty()
                }
                Err(e) => reply_for(&e),
            }
        }

        ClientEvent::RoomKick { room_code, player_id } => {
            match state.lifecycle.kick(&room_code, me, player_id).await {
                Ok((removal, snap)) => {
                    state.registry.unbind_room(player_id);
                    let event = ServerEvent::PlayerRemoved {
                        room_code: room_code.clone(),
                        player_id,
                        reason: RemovalReason::Kicked,
                        new_host: removal.new_host,
                        room_finished: removal.finished,
                        task_id: None,
                        sender_id: me,
                    };
                    // The kicked player is told directly, outside the
                    // room's acknowledgment tracking.
                    state.registry.send_to(player_id, event.clone());
                    broadcast_tracked(
                        state,
                        room_code,
                        me,
                        snap.players.iter().map(|p| p.player_id),
                        event,
                    );
                    Reply::ok_empty()
                }
                Err(e) => reply_for(&e),
            }
        }

        ClientEvent::RoomReady { ready } => {
            let Some(code) = state.registry.room_of(me) else {
                return Reply::err(ErrorCode::State, "not in a room");
            };
            match state.lifecycle.set_ready(&code, me, ready).await {
                Ok(snap) => {
                    broadcast_tracked(
                        state,
                        code.clone(),
                        me,
                        snap.players.iter().map(|p| p.player_id),
                        ServerEvent::PlayerReady {
                            room_code: code,
                            player_id: me,
                            ready,
                            task_id: None,
                            sender_id: me,
                        },
                    );
                    Reply::ok_empty()
                }
                Err(e) => reply_for(&e),
            }
        }

        ClientEvent::UpdateSettings { settings } => {
            let Some(code) = state.registry.room_of(me) else {
                return Reply::err(ErrorCode::State, "not in a room");
            };
            match state.lifecycle.update_settings(&code, me, settings).await {
                Ok(snap) => {
                    broadcast_tracked(
                        state,
                        code.clone(),
                        me,
                        snap.players.iter().map(|p| p.player_id),
                        ServerEvent::SettingsUpdated {
                            room_code: code,
                            settings: snap.settings.clone(),
                            task_id: None,
                            sender_id: me,
                        },
                    );
                    ok_json(&snap)
                }
                Err(e) => reply_for(&e),
            }
        }

        ClientEvent::GameStart {} => {
            let Some(code) = state.registry.room_of(me) else {
                return Reply::err(ErrorCode::State, "not in a room");
            };
            match state.lifecycle.start(&code, me).await {
                Ok(snap) => {
                    broadcast_tracked(
                        state,
                        code,
                        me,
                        snap.players.iter().map(|p| p.player_id),
                        ServerEvent::GameStarted {
                            room: snap.clone(),
                            task_id: None,
                            sender_id: me,
                        },
                    );
                    ok_json(&snap)
                }
                Err(e) => reply_for(&e),
            }
        }

        ClientEvent::AnswerSubmit {
            question_id,
            answer,
            time_taken_ms,
        } => {
            let Some(code) = state.registry.room_of(me) else {
                return Reply::err(ErrorCode::State, "not in a room");
            };
            match state
                .answers
                .submit(&code, me, question_id, answer, time_taken_ms)
                .await
            {
                Ok((outcome, room)) => {
                    broadcast_tracked(
                        state,
                        code.clone(),
                        me,
                        room.member_ids(),
                        ServerEvent::QuestionAnswered {
                            room_code: code.clone(),
                            player_id: me,
                            question_id,
                            is_correct: outcome.is_correct,
                            correct_option: outcome.correct_option,
                            score: outcome.score,
                            round_complete: outcome.round_complete,
                            task_id: None,
                            sender_id: me,
                        },
                    );
                    if outcome.game_over {
                        if let Some(summary) = room.summary.clone() {
                            let finished = ServerEvent::GameFinished {
                                room_code: code.clone(),
                                status: room.status,
                                summary,
                                task_id: None,
                                sender_id: me,
                            };
                            state.registry.send_to(me, finished.clone());
                            broadcast_tracked(state, code, me, room.member_ids(), finished);
                        }
                    }
                    Reply::ok(json!({
                        "is_correct": outcome.is_correct,
                        "correct_option": outcome.correct_option,
                        "score": outcome.score,
                        "round_complete": outcome.round_complete,
                        "game_over": outcome.game_over,
                    }))
                }
                Err(e) => reply_for(&e),
            }
        }

        ClientEvent::Leaderboard { question_id } => {
            let Some(code) = state.registry.room_of(me) else {
                return Reply::err(ErrorCode::State, "not in a room");
            };
            match state.answers.leaderboard(&code, question_id).await {
                Ok(rows) => {
                    let members = match state.lifecycle.room(&code).await {
                        Ok(room) => room.member_ids(),
                        Err(_) => Vec::new(),
                    };
                    broadcast_tracked(
                        state,
                        code.clone(),
                        me,
                        members,
                        ServerEvent::Leaderboard {
                            room_code: code,
                            question_id,
                            rows: rows.clone(),
                            task_id: None,
                            sender_id: me,
                        },
                    );
                    Reply::ok(json!({ "rows": rows }))
                }
                Err(e) => reply_for(&e),
            }
        }

        ClientEvent::MessageAck { task_id } => {
            let outcome = state.buffers.acknowledge(task_id, me);
            let all_acknowledged = matches!(outcome, AckOutcome::Cleared { .. });
            settle(state, task_id, outcome);
            Reply::ok(json!({ "all_acknowledged": all_acknowledged }))
        }
    }
}

/// Full teardown when a connection ends: registry entry gone, pending
/// acknowledgments released, and an implicit leave of the bound room.
/// Answer records survive; only the live membership changes. A socket
/// that was displaced by a newer login for the same player tears down
/// nothing.
pub(crate) async fn handle_disconnect<S, C, A>(
    state: &Arc<GatewayState<S, C, A>>,
    player: PlayerId,
    channel: &OutboundSender,
) where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    let Some(room) = state.registry.unregister(player, channel) else {
        return;
    };
    for (task, sender) in state.buffers.forget_player(player) {
        state
            .registry
            .send_to(sender, ServerEvent::BufferCleared { task_id: task });
    }
    let Some(code) = room else { return };
    match state.lifecycle.leave(&code, player).await {
        Ok((removal, snap)) => {
            broadcast_tracked(
                state,
                code.clone(),
                player,
                snap.players.iter().map(|p| p.player_id),
                ServerEvent::PlayerRemoved {
                    room_code: code,
                    player_id: player,
                    reason: RemovalReason::Disconnected,
                    new_host: removal.new_host,
                    room_finished: removal.finished,
                    task_id: None,
                    sender_id: player,
                },
            );
        }
        Err(e) => {
            tracing::debug!(%code, %player, error = %e, "implicit leave failed");
        }
    }
}

/// Sends `event` to every listed member except the sender, tracking the
/// delivery when anyone is there to receive it. Recipients that vanish
/// between the connectivity check and the send are acked out so the
/// buffer cannot wedge on them.
fn broadcast_tracked<S, C, A>(
    state: &Arc<GatewayState<S, C, A>>,
    room: RoomCode,
    sender: PlayerId,
    members: impl IntoIterator<Item = PlayerId>,
    event: ServerEvent,
) where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    let connected: Vec<PlayerId> = members
        .into_iter()
        .filter(|&p| p != sender && state.registry.is_connected(p))
        .collect();
    let name = event.name();
    let Some(task) = state
        .buffers
        .create(room, sender, name, connected.iter().copied())
    else {
        return;
    };
    let event = event.with_task_id(task);
    tracing::debug!(%task, %sender, event = name, recipients = connected.len(), "broadcast");
    let reached = state.registry.broadcast(connected.iter().copied(), &event);
    for player in connected {
        if !reached.contains(&player) {
            let outcome = state.buffers.acknowledge(task, player);
            settle(state, task, outcome);
        }
    }
}

/// Notifies the original sender when their broadcast fully cleared.
fn settle<S, C, A>(state: &Arc<GatewayState<S, C, A>>, task: TaskId, outcome: AckOutcome)
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
    A: Authenticator,
{
    if let AckOutcome::Cleared { sender } = outcome {
        state
            .registry
            .send_to(sender, ServerEvent::BufferCleared { task_id: task });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use quizcast_delivery::DeliveryBuffers;
    use quizcast_room::{AnswerProcessor, CodeAllocator, RoomLifecycle, StaticCatalog};
    use quizcast_session::{DevAuthenticator, PeerRegistry};
    use quizcast_store::{Cache, MemoryStore};
    use tokio::sync::mpsc;

    use crate::GatewayConfig;

    type TestState = GatewayState<MemoryStore<RoomCode, Room>, StaticCatalog, DevAuthenticator>;

    fn test_state() -> Arc<TestState> {
        let config = GatewayConfig::default();
        let store: Arc<MemoryStore<RoomCode, Room>> = Arc::new(MemoryStore::new());
        let catalog = Arc::new(StaticCatalog::uniform(20));
        let cache = Arc::new(Cache::new(store, config.cache.clone()));
        let lifecycle = Arc::new(
            RoomLifecycle::new(Arc::clone(&cache), Arc::clone(&catalog))
                .with_allocator(CodeAllocator::new(config.retry.clone())),
        );
        let answers = Arc::new(AnswerProcessor::new(cache, catalog));
        Arc::new(GatewayState {
            lifecycle,
            answers,
            registry: PeerRegistry::new(),
            buffers: Arc::new(DeliveryBuffers::new(config.delivery.clone())),
            auth: DevAuthenticator,
        })
    }

    fn identity(id: u64, name: &str) -> Identity {
        Identity {
            player_id: PlayerId(id),
            display_name: name.to_string(),
            avatar: None,
        }
    }

    fn create_room_event() -> ClientEvent {
        ClientEvent::RoomJoin {
            room_code: None,
            player_name: None,
            is_host: true,
            settings: None,
        }
    }

    #[tokio::test]
    async fn test_failed_leave_keeps_room_binding() {
        let state = test_state();
        let me = PlayerId(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        state.registry.register(me, tx);
        // Bind to a code with no document behind it so the leave fails.
        let ghost = RoomCode::parse("ZZZ999").unwrap();
        state.registry.bind_room(me, ghost.clone()).unwrap();

        let reply = dispatch(&state, &identity(1, "alice"), ClientEvent::RoomLeave {}).await;

        assert!(!reply.success);
        assert_eq!(
            state.registry.room_of(me),
            Some(ghost),
            "binding survives a failed leave"
        );
    }

    #[tokio::test]
    async fn test_displaced_socket_close_spares_relogin() {
        let state = test_state();
        let me = PlayerId(1);
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        state.registry.register(me, old_tx.clone());

        let reply = dispatch(&state, &identity(1, "alice"), create_room_event()).await;
        assert!(reply.success);
        let code = state.registry.room_of(me).expect("bound after create");

        // Second login as the same player, then the old socket closes.
        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        state.registry.register(me, new_tx.clone());
        handle_disconnect(&state, me, &old_tx).await;

        assert!(state.registry.is_connected(me));
        assert_eq!(state.registry.room_of(me), Some(code.clone()));
        let room = state.lifecycle.room(&code).await.expect("room survives");
        assert!(room.players.iter().any(|p| p.id == me));

        // The live connection closing still runs the implicit leave.
        handle_disconnect(&state, me, &new_tx).await;
        assert!(!state.registry.is_connected(me));
        assert!(state.lifecycle.room(&code).await.is_err(), "emptied room discarded");
    }
}
