//! Error types for the room domain.

use quizcast_protocol::{PlayerId, QuestionId, RoomCode, RoomStatus, SettingsError};
use quizcast_store::{StoreError, TxError};

use crate::CatalogError;

/// Rejections produced by the room state machine. These are expected
/// outcomes, resolved straight back to the caller — not incidents.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    /// No live room under this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room is at `settings.max_players`.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The player is already a member.
    #[error("player {0} already in room {1}")]
    AlreadyJoined(PlayerId, RoomCode),

    /// The player is not a member.
    #[error("player {0} not in room {1}")]
    NotMember(PlayerId, RoomCode),

    /// The acting player is not the host.
    #[error("player {0} is not the host")]
    NotHost(PlayerId),

    /// Kicking the host is not a thing; the host leaves or disbands.
    #[error("player {0} is the host and cannot be kicked")]
    TargetIsHost(PlayerId),

    /// The operation is illegal for the room's lifecycle state.
    #[error("cannot {op} while room is {status}")]
    InvalidState {
        op: &'static str,
        status: RoomStatus,
    },

    /// `finish` on an already-finished room is an error, never a silent
    /// success.
    #[error("room {0} already finished")]
    AlreadyFinished(RoomCode),

    /// Start needs at least two players.
    #[error("need at least {need} players to start, have {have}")]
    NotEnoughPlayers { have: usize, need: usize },

    /// Start needs every non-host player ready.
    #[error("not all players are ready")]
    PlayersNotReady,

    /// The question is not part of this room's game.
    #[error("question {0} is not part of this game")]
    UnknownQuestion(QuestionId),

    /// The player already answered this question. Submission is not
    /// idempotent-retryable.
    #[error("player {0} already answered question {1}")]
    DuplicateAnswer(PlayerId, QuestionId),

    /// The generated code collided with a concurrent creation.
    #[error("room code {0} already taken")]
    CodeTaken(RoomCode),
}

/// Failures surfaced by the lifecycle/answer services: a domain
/// rejection, a collaborator failure, or storage trouble.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Room-code generation ran out of attempts.
    #[error("room code allocation exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The store failed; logged with context, surfaced to clients as a
    /// generic internal error.
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl From<TxError<RoomError>> for ServiceError {
    fn from(e: TxError<RoomError>) -> Self {
        match e {
            TxError::Store(e) => Self::Store(e),
            TxError::App(e) => Self::Room(e),
        }
    }
}
