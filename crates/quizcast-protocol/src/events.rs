//! The real-time event surface.
//!
//! Adjacently tagged JSON: `{ "event": "room:join", "data": { ... } }`.
//! Event names match the public protocol (`room:join`, `answer:submit`,
//! `message:ack`, ...), so the tags are renamed per variant.
//!
//! Every client event produces exactly one [`Reply`] back to the caller;
//! server broadcasts to the rest of the room carry a `task_id` and
//! `sender_id` whenever they have at least one receiver, which is what
//! drives the acknowledgment flow.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    GameSummary, LeaderboardRow, PlayerId, PlayerSnapshot, QuestionId,
    RoomCode, RoomSettings, RoomSnapshot, RoomStatus, TaskId,
};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// The wire-level error taxonomy. Every domain failure maps onto exactly
/// one of these before it reaches a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCode {
    /// Malformed or out-of-range input.
    Validation,
    /// Missing, malformed, or rejected credential.
    Auth,
    /// Unknown room or question.
    NotFound,
    /// Operation illegal for the room's current lifecycle state.
    State,
    /// Room full, already joined, duplicate answer, not host, code taken.
    Conflict,
    /// Internal failure (storage, allocation exhaustion). Details are
    /// logged server-side, never sent to clients.
    Internal,
}

/// The error half of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// The per-call result envelope. Every dispatched client event resolves
/// with one of these — success or failure, never silence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    /// A successful reply with a payload.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A successful reply with no payload.
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// A failed reply carrying a typed error.
    pub fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code,
                message: message.into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Events a client may send after connecting.
///
/// `Auth` must be the first event on a fresh connection; everything else
/// is rejected until the credential is verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Present a credential. First and only pre-session event.
    #[serde(rename = "auth")]
    Auth { token: String },

    /// Join an existing room by code, or create one as host when
    /// `room_code` is absent.
    #[serde(rename = "room:join")]
    RoomJoin {
        #[serde(default)]
        room_code: Option<RoomCode>,
        #[serde(default)]
        player_name: Option<String>,
        #[serde(default)]
        is_host: bool,
        #[serde(default)]
        settings: Option<RoomSettings>,
    },

    /// Leave the current room.
    #[serde(rename = "room:leave")]
    RoomLeave {},

    /// Host removes another member.
    #[serde(rename = "room:kick")]
    RoomKick {
        room_code: RoomCode,
        player_id: PlayerId,
    },

    /// Toggle the caller's ready flag while waiting.
    #[serde(rename = "room:ready")]
    RoomReady { ready: bool },

    /// Host replaces the room settings while waiting.
    #[serde(rename = "room:settings")]
    UpdateSettings { settings: RoomSettings },

    /// Host starts the game.
    #[serde(rename = "game:start")]
    GameStart {},

    /// Submit an answer for one question.
    #[serde(rename = "answer:submit")]
    AnswerSubmit {
        question_id: QuestionId,
        answer: u8,
        time_taken_ms: u64,
    },

    /// Request the current leaderboard; also broadcast to the room.
    #[serde(rename = "question:leaderboard")]
    Leaderboard { question_id: QuestionId },

    /// Acknowledge receipt of a broadcast by its task id.
    #[serde(rename = "message:ack")]
    MessageAck { task_id: TaskId },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Why a player left a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalReason {
    Left,
    Kicked,
    Disconnected,
}

/// Events the server pushes to clients.
///
/// Broadcast variants carry `task_id: Option<TaskId>` — present whenever
/// the broadcast had at least one receiver and is being tracked for
/// acknowledgment — plus the `sender_id` whose action caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Resolution of the caller's own pending request.
    #[serde(rename = "reply")]
    Reply(Reply),

    /// Credential accepted; the session is bound to this player.
    #[serde(rename = "auth:ok")]
    AuthOk { player_id: PlayerId },

    /// A player joined the room.
    #[serde(rename = "player:joined")]
    PlayerJoined {
        room: RoomSnapshot,
        player: PlayerSnapshot,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// A player left, was kicked, or disconnected.
    #[serde(rename = "player:removed")]
    PlayerRemoved {
        room_code: RoomCode,
        player_id: PlayerId,
        reason: RemovalReason,
        new_host: Option<PlayerId>,
        room_finished: bool,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// A player's ready flag changed.
    #[serde(rename = "player:ready")]
    PlayerReady {
        room_code: RoomCode,
        player_id: PlayerId,
        ready: bool,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// The host replaced the room settings.
    #[serde(rename = "settings:updated")]
    SettingsUpdated {
        room_code: RoomCode,
        settings: RoomSettings,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// The game started.
    #[serde(rename = "game:started")]
    GameStarted {
        room: RoomSnapshot,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// A player answered the current question.
    #[serde(rename = "question:answered")]
    QuestionAnswered {
        room_code: RoomCode,
        player_id: PlayerId,
        question_id: QuestionId,
        is_correct: bool,
        correct_option: u8,
        score: u32,
        round_complete: bool,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// A leaderboard snapshot.
    #[serde(rename = "question:leaderboard")]
    Leaderboard {
        room_code: RoomCode,
        question_id: QuestionId,
        rows: Vec<LeaderboardRow>,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// The game finished; final standings are attached.
    #[serde(rename = "game:finished")]
    GameFinished {
        room_code: RoomCode,
        status: RoomStatus,
        summary: GameSummary,
        task_id: Option<TaskId>,
        sender_id: PlayerId,
    },

    /// Every expected receiver acknowledged the sender's broadcast.
    #[serde(rename = "buffer:cleared")]
    BufferCleared { task_id: TaskId },
}

impl ServerEvent {
    /// The wire name of this event, used when registering delivery tasks.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reply(_) => "reply",
            Self::AuthOk { .. } => "auth:ok",
            Self::PlayerJoined { .. } => "player:joined",
            Self::PlayerRemoved { .. } => "player:removed",
            Self::PlayerReady { .. } => "player:ready",
            Self::SettingsUpdated { .. } => "settings:updated",
            Self::GameStarted { .. } => "game:started",
            Self::QuestionAnswered { .. } => "question:answered",
            Self::Leaderboard { .. } => "question:leaderboard",
            Self::GameFinished { .. } => "game:finished",
            Self::BufferCleared { .. } => "buffer:cleared",
        }
    }

    /// Sets the delivery-task id on a broadcast variant. No-op for
    /// direct-only events (`Reply`, `AuthOk`, `BufferCleared`).
    pub fn with_task_id(mut self, id: TaskId) -> Self {
        match &mut self {
            Self::PlayerJoined { task_id, .. }
            | Self::PlayerRemoved { task_id, .. }
            | Self::PlayerReady { task_id, .. }
            | Self::SettingsUpdated { task_id, .. }
            | Self::GameStarted { task_id, .. }
            | Self::QuestionAnswered { task_id, .. }
            | Self::Leaderboard { task_id, .. }
            | Self::GameFinished { task_id, .. } => *task_id = Some(id),
            Self::Reply(_) | Self::AuthOk { .. } | Self::BufferCleared { .. } => {}
        }
        self
    }
}
