//! Transport-free facade over the room services.
//!
//! For embedding the engine behind something other than the WebSocket
//! gateway (an HTTP layer, an admin CLI, tests). Every call resolves to
//! an [`ApiResponse`] with the conventional `{status, message, data}`
//! shape; failures never escape as `Err`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use quizcast_protocol::{PlayerId, QuestionId, RoomCode, RoomSettings};
use quizcast_room::{AnswerProcessor, NewPlayer, QuestionCatalog, Room, RoomLifecycle};
use quizcast_store::Store;

use crate::error::error_code;

/// Uniform response envelope. `status` is `1` for success, `0` for
/// failure.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    fn ok<T: Serialize>(message: &str, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                status: 1,
                message: message.to_string(),
                data: Some(value),
            },
            Err(e) => {
                tracing::error!(error = %e, "api payload serialization failed");
                Self::fail("internal error")
            }
        }
    }

    fn ok_empty(message: &str) -> Self {
        Self {
            status: 1,
            message: message.to_string(),
            data: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            message: message.into(),
            data: None,
        }
    }

    fn from_error(e: &quizcast_room::ServiceError) -> Self {
        use quizcast_protocol::ErrorCode;
        if error_code(e) == ErrorCode::Internal {
            tracing::error!(error = %e, "internal failure surfaced through api");
            Self::fail("internal error")
        } else {
            Self::fail(e.to_string())
        }
    }
}

/// The facade itself. Cheap to clone; both services are shared.
pub struct Api<S, C> {
    lifecycle: Arc<RoomLifecycle<S, C>>,
    answers: Arc<AnswerProcessor<S, C>>,
}

impl<S, C> Clone for Api<S, C> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
            answers: Arc::clone(&self.answers),
        }
    }
}

impl<S, C> Api<S, C>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
{
    pub fn new(
        lifecycle: Arc<RoomLifecycle<S, C>>,
        answers: Arc<AnswerProcessor<S, C>>,
    ) -> Self {
        Self { lifecycle, answers }
    }

    pub async fn create_room(
        &self,
        host: NewPlayer,
        settings: Option<RoomSettings>,
    ) -> ApiResponse {
        match self.lifecycle.create_room(host, settings).await {
            Ok(snap) => ApiResponse::ok("room created", &snap),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    pub async fn join_room(&self, code: &RoomCode, profile: NewPlayer) -> ApiResponse {
        match self.lifecycle.join(code, profile).await {
            Ok(snap) => ApiResponse::ok("joined room", &snap),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    pub async fn leave_room(&self, code: &RoomCode, player: PlayerId) -> ApiResponse {
        match self.lifecycle.leave(code, player).await {
            Ok(_) => ApiResponse::ok_empty("left room"),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    pub async fn room(&self, code: &RoomCode) -> ApiResponse {
        match self.lifecycle.snapshot(code).await {
            Ok(snap) => ApiResponse::ok("room", &snap),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    pub async fn start_game(&self, code: &RoomCode, by: PlayerId) -> ApiResponse {
        match self.lifecycle.start(code, by).await {
            Ok(snap) => ApiResponse::ok("game started", &snap),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    pub async fn leaderboard(&self, code: &RoomCode, question: QuestionId) -> ApiResponse {
        match self.answers.leaderboard(code, question).await {
            Ok(rows) => ApiResponse::ok("leaderboard", &rows),
            Err(e) => ApiResponse::from_error(&e),
        }
    }
}
