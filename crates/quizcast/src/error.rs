//! Gateway error type and the mapping from domain failures onto the
//! wire-level error taxonomy.

use quizcast_protocol::{ErrorCode, ProtocolError, Reply};
use quizcast_room::{CatalogError, RoomError, ServiceError};
use quizcast_session::SessionError;

/// Top-level error for the gateway. Connection handlers bubble these up;
/// `run` logs them and keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The peer closed or broke the connection before authenticating.
    #[error("connection ended before authentication")]
    HandshakeAborted,
}

/// Maps a service failure onto the wire taxonomy.
pub fn error_code(e: &ServiceError) -> ErrorCode {
    match e {
        ServiceError::Room(e) => match e {
            RoomError::NotFound(_) => ErrorCode::NotFound,
            RoomError::UnknownQuestion(_) => ErrorCode::NotFound,
            RoomError::RoomFull(_)
            | RoomError::AlreadyJoined(_, _)
            | RoomError::DuplicateAnswer(_, _)
            | RoomError::NotHost(_)
            | RoomError::CodeTaken(_) => ErrorCode::Conflict,
            RoomError::NotMember(_, _) => ErrorCode::Auth,
            RoomError::TargetIsHost(_) => ErrorCode::Validation,
            RoomError::InvalidState { .. }
            | RoomError::AlreadyFinished(_)
            | RoomError::NotEnoughPlayers { .. }
            | RoomError::PlayersNotReady => ErrorCode::State,
        },
        ServiceError::Settings(_) => ErrorCode::Validation,
        ServiceError::Catalog(e) => match e {
            CatalogError::UnknownQuestion(_) => ErrorCode::NotFound,
            CatalogError::InsufficientQuestions { .. } => ErrorCode::Validation,
            CatalogError::Unavailable(_) => ErrorCode::Internal,
        },
        ServiceError::Exhausted { .. } | ServiceError::Store(_) => ErrorCode::Internal,
    }
}

/// Builds the failure [`Reply`] for a service error. Internal failures
/// are logged here and reach the client as a generic message.
pub fn reply_for(e: &ServiceError) -> Reply {
    let code = error_code(e);
    if code == ErrorCode::Internal {
        tracing::error!(error = %e, "internal failure surfaced to client");
        Reply::err(code, "internal error")
    } else {
        Reply::err(code, e.to_string())
    }
}
