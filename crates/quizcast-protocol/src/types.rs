//! Read-only views of room state sent to clients.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{PlayerId, QuestionId, RoomCode, RoomSettings};

/// A room's lifecycle state.
///
/// Strictly monotonic: `Waiting → Active → Finished`, no regression and
/// no skipping backward. [`RoomStatus::can_advance_to`] encodes the legal
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Active,
    Finished,
}

impl RoomStatus {
    /// Returns `true` if the room accepts joins.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` if a game is running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if moving to `target` respects the monotonic order.
    pub fn can_advance_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Active)
                | (Self::Active, Self::Finished)
                | (Self::Waiting, Self::Finished)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// One member as clients see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub name: String,
    pub avatar: Option<String>,
    pub score: u32,
    pub is_host: bool,
    pub is_ready: bool,
}

/// The full room view sent on join and lobby queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub host_id: PlayerId,
    pub players: Vec<PlayerSnapshot>,
    pub settings: RoomSettings,
    pub status: RoomStatus,
    pub current_question_index: usize,
    pub question_ids: Vec<QuestionId>,
}

/// One leaderboard entry. Rows arrive pre-sorted by the ranking rules
/// (score desc, accuracy desc, average answer time asc, stable ties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
    pub correct: usize,
    pub answered: usize,
    /// Percentage of answered questions that were correct; 0 when the
    /// player has not answered anything.
    pub accuracy: f64,
    /// Mean time-to-answer in milliseconds across answered questions.
    pub avg_time_ms: f64,
}

/// Final aggregate stats written when a game finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub standings: Vec<LeaderboardRow>,
    pub winner: Option<PlayerId>,
}
