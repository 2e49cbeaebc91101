//! Answer submission and standings queries.

use std::sync::Arc;

use chrono::Utc;

use quizcast_protocol::{LeaderboardRow, PlayerId, QuestionId, RoomCode};
use quizcast_store::Store;

use crate::lifecycle::update_with_retry;
use crate::{
    AnswerOutcome, QuestionCatalog, Room, RoomCache, RoomError, ServiceError, leaderboard,
};

/// Validates, scores, and records answer submissions.
pub struct AnswerProcessor<S, C> {
    cache: Arc<RoomCache<S>>,
    catalog: Arc<C>,
}

impl<S, C> AnswerProcessor<S, C>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
{
    pub fn new(cache: Arc<RoomCache<S>>, catalog: Arc<C>) -> Self {
        Self { cache, catalog }
    }

    /// Submits one answer.
    ///
    /// The catalog lookup happens before the transaction; the grading,
    /// the duplicate check, and any round advancement or game finish all
    /// commit atomically inside it. The updated aggregate comes back so
    /// the caller can broadcast the result and, on game over, the stored
    /// summary.
    pub async fn submit(
        &self,
        code: &RoomCode,
        player: PlayerId,
        question: QuestionId,
        selected_option: u8,
        time_taken_ms: u64,
    ) -> Result<(AnswerOutcome, Room), ServiceError> {
        let correct_option = self.catalog.correct_option(question).await?;

        let (room, outcome) = update_with_retry(&self.cache, code, |room| {
            room.record_answer(
                player,
                question,
                selected_option,
                correct_option,
                time_taken_ms,
                Utc::now(),
            )
        })
        .await?;

        tracing::debug!(
            %code,
            %player,
            %question,
            correct = outcome.is_correct,
            round_complete = outcome.round_complete,
            game_over = outcome.game_over,
            "answer recorded"
        );
        Ok((outcome, room))
    }

    /// Cumulative standings for a room, queried per question so clients
    /// can show them between rounds. The question must belong to the
    /// room's game.
    pub async fn leaderboard(
        &self,
        code: &RoomCode,
        question: QuestionId,
    ) -> Result<Vec<LeaderboardRow>, ServiceError> {
        let room = self
            .cache
            .get(code)
            .await
            .map_err(ServiceError::Store)?
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        if !room.question_ids.contains(&question) {
            return Err(RoomError::UnknownQuestion(question).into());
        }
        Ok(leaderboard::rank(&room.players, &room.answered))
    }
}
