//! The `Room` aggregate and its state machine.
//!
//! Every rule lives here as a pure method: no I/O, no clocks of its own
//! (callers pass `now`), so the whole machine is unit-testable and the
//! services just run these methods inside a store transaction.
//!
//! Invariants held by construction:
//! - exactly one `is_host` member while `players` is non-empty
//! - `players.len() <= settings.max_players`
//! - `(player_id, question_id)` unique within `answered`
//! - `status` only ever advances `Waiting → Active → Finished`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quizcast_protocol::{
    GameSummary, PlayerId, PlayerSnapshot, QuestionId, RoomCode, RoomSettings,
    RoomSnapshot, RoomStatus,
};

use crate::{RoomError, leaderboard};

/// Points awarded for a correct answer. Wrong answers award nothing.
pub const POINTS_PER_CORRECT: u32 = 100;

/// Minimum members required to start a game.
pub const MIN_PLAYERS_TO_START: usize = 2;

/// The room cache type every service operates through.
pub type RoomCache<S> = quizcast_store::Cache<RoomCode, Room, S>;

/// Join-time profile for a player, as supplied by the identity verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlayer {
    pub id: PlayerId,
    pub name: String,
    pub avatar: Option<String>,
}

/// One room member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: Option<String>,
    pub score: u32,
    pub is_host: bool,
    pub is_ready: bool,
}

impl Player {
    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            score: self.score,
            is_host: self.is_host,
            is_ready: self.is_ready,
        }
    }
}

/// One accepted answer submission. Append-only; never removed, even when
/// the player later leaves the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub player_id: PlayerId,
    pub question_id: QuestionId,
    pub selected_option: u8,
    pub is_correct: bool,
    pub time_taken_ms: u64,
    pub answered_at: DateTime<Utc>,
}

/// What a player's removal did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    /// Set when the departing player was host and someone remained: the
    /// earliest-joined remaining player took over.
    pub new_host: Option<PlayerId>,
    /// `true` when the room emptied and finished.
    pub finished: bool,
}

/// Result of one accepted answer submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_option: u8,
    /// The player's running score after this submission.
    pub score: u32,
    /// Every current member has now answered the current question.
    pub round_complete: bool,
    /// That was the final round; the room is now finished.
    pub game_over: bool,
}

/// The aggregate root for one game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub code: RoomCode,
    pub host_id: PlayerId,
    pub players: Vec<Player>,
    pub settings: RoomSettings,
    pub question_ids: Vec<QuestionId>,
    pub status: RoomStatus,
    pub current_question_index: usize,
    pub answered: Vec<AnswerRecord>,
    pub summary: Option<GameSummary>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Room {
    /// Creates a room in `Waiting` with the creator as sole member and
    /// host. The only entry point that produces a room.
    pub fn new(
        code: RoomCode,
        host: NewPlayer,
        settings: RoomSettings,
        question_ids: Vec<QuestionId>,
        now: DateTime<Utc>,
    ) -> Self {
        let host_id = host.id;
        let host_player = Player {
            id: host.id,
            name: host.name,
            avatar: host.avatar,
            score: 0,
            is_host: true,
            is_ready: false,
        };
        Self {
            code,
            host_id,
            players: vec![host_player],
            settings,
            question_ids,
            status: RoomStatus::Waiting,
            current_question_index: 0,
            answered: Vec::new(),
            summary: None,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Looks up a member.
    pub fn member(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn member_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// The question currently being played, while `Active`.
    pub fn current_question(&self) -> Option<QuestionId> {
        if !self.status.is_active() {
            return None;
        }
        self.question_ids.get(self.current_question_index).copied()
    }

    /// All member ids, in join order.
    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// The client-facing view.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            host_id: self.host_id,
            players: self.players.iter().map(Player::snapshot).collect(),
            settings: self.settings.clone(),
            status: self.status,
            current_question_index: self.current_question_index,
            question_ids: self.question_ids.clone(),
        }
    }

    // -- Mutations ---------------------------------------------------------

    /// Adds a member. Legal only while `Waiting`, below capacity, and
    /// for players not already present.
    pub fn join(&mut self, profile: NewPlayer) -> Result<&Player, RoomError> {
        if !self.status.is_joinable() {
            return Err(RoomError::InvalidState {
                op: "join",
                status: self.status,
            });
        }
        if self.member(profile.id).is_some() {
            return Err(RoomError::AlreadyJoined(profile.id, self.code.clone()));
        }
        if self.players.len() >= self.settings.max_players {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        self.players.push(Player {
            id: profile.id,
            name: profile.name,
            avatar: profile.avatar,
            score: 0,
            is_host: false,
            is_ready: false,
        });
        Ok(self.players.last().expect("just pushed"))
    }

    /// Removes a member, promoting the earliest-joined remaining player
    /// when the host departs, and finishing the room when it empties.
    /// Already-recorded answers are never erased.
    pub fn remove_player(
        &mut self,
        target: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Removal, RoomError> {
        let idx = self
            .players
            .iter()
            .position(|p| p.id == target)
            .ok_or_else(|| RoomError::NotMember(target, self.code.clone()))?;
        let was_host = self.players[idx].is_host;
        self.players.remove(idx);

        if self.players.is_empty() {
            if self.status != RoomStatus::Finished {
                self.status = RoomStatus::Finished;
                self.finished_at = Some(now);
            }
            return Ok(Removal {
                new_host: None,
                finished: true,
            });
        }

        let mut new_host = None;
        if was_host {
            // Stable join order: index 0 is the earliest-joined survivor.
            let successor = &mut self.players[0];
            successor.is_host = true;
            self.host_id = successor.id;
            new_host = Some(successor.id);
        }
        Ok(Removal {
            new_host,
            finished: false,
        })
    }

    /// Host removes another member. The target must not be the host.
    pub fn kick(
        &mut self,
        acting: PlayerId,
        target: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<Removal, RoomError> {
        if self.host_id != acting {
            return Err(RoomError::NotHost(acting));
        }
        let victim = self
            .member(target)
            .ok_or_else(|| RoomError::NotMember(target, self.code.clone()))?;
        if victim.is_host {
            return Err(RoomError::TargetIsHost(target));
        }
        self.remove_player(target, now)
    }

    /// Sets a member's ready flag. Legal only while `Waiting`.
    pub fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<(), RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState {
                op: "set ready",
                status: self.status,
            });
        }
        let code = self.code.clone();
        let member = self
            .member_mut(player)
            .ok_or(RoomError::NotMember(player, code))?;
        member.is_ready = ready;
        Ok(())
    }

    /// Replaces the settings and the question selection. Host-only,
    /// `Waiting`-only; once the game starts both are immutable.
    pub fn update_settings(
        &mut self,
        by: PlayerId,
        settings: RoomSettings,
        question_ids: Vec<QuestionId>,
    ) -> Result<(), RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState {
                op: "update settings",
                status: self.status,
            });
        }
        if self.host_id != by {
            return Err(RoomError::NotHost(by));
        }
        if settings.max_players < self.players.len() {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        self.settings = settings;
        self.question_ids = question_ids;
        Ok(())
    }

    /// Starts the game. Host-only, from `Waiting`, with at least
    /// [`MIN_PLAYERS_TO_START`] members and every non-host member ready
    /// (the host is implicitly ready).
    pub fn start(&mut self, by: PlayerId, now: DateTime<Utc>) -> Result<(), RoomError> {
        if self.host_id != by {
            return Err(RoomError::NotHost(by));
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidState {
                op: "start",
                status: self.status,
            });
        }
        if self.players.len() < MIN_PLAYERS_TO_START {
            return Err(RoomError::NotEnoughPlayers {
                have: self.players.len(),
                need: MIN_PLAYERS_TO_START,
            });
        }
        if self.players.iter().any(|p| !p.is_host && !p.is_ready) {
            return Err(RoomError::PlayersNotReady);
        }
        debug_assert!(self.status.can_advance_to(RoomStatus::Active));
        self.status = RoomStatus::Active;
        self.current_question_index = 0;
        self.started_at = Some(now);
        Ok(())
    }

    /// Records one answer submission.
    ///
    /// Duplicate `(player, question)` pairs are a hard conflict, not an
    /// idempotent retry. When the submission completes the current
    /// round, the index advances — or, on the final question, the game
    /// finishes inside the same mutation.
    pub fn record_answer(
        &mut self,
        player: PlayerId,
        question: QuestionId,
        selected_option: u8,
        correct_option: u8,
        time_taken_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, RoomError> {
        if self.status != RoomStatus::Active {
            return Err(RoomError::InvalidState {
                op: "submit answer",
                status: self.status,
            });
        }
        if self.member(player).is_none() {
            return Err(RoomError::NotMember(player, self.code.clone()));
        }
        if !self.question_ids.contains(&question) {
            return Err(RoomError::UnknownQuestion(question));
        }
        if self
            .answered
            .iter()
            .any(|r| r.player_id == player && r.question_id == question)
        {
            return Err(RoomError::DuplicateAnswer(player, question));
        }

        let is_correct = selected_option == correct_option;
        self.answered.push(AnswerRecord {
            player_id: player,
            question_id: question,
            selected_option,
            is_correct,
            time_taken_ms,
            answered_at: now,
        });

        let member = self.member_mut(player).expect("membership checked above");
        if is_correct {
            member.score += POINTS_PER_CORRECT;
        }
        let score = member.score;

        let round_complete = self.round_complete();
        let mut game_over = false;
        if round_complete {
            if self.current_question_index + 1 < self.question_ids.len() {
                self.current_question_index += 1;
            } else {
                self.finish(now)?;
                game_over = true;
            }
        }

        Ok(AnswerOutcome {
            is_correct,
            correct_option,
            score,
            round_complete,
            game_over,
        })
    }

    /// `true` when every current member has answered the current question.
    fn round_complete(&self) -> bool {
        let Some(question) = self.question_ids.get(self.current_question_index) else {
            return false;
        };
        self.players.iter().all(|p| {
            self.answered
                .iter()
                .any(|r| r.player_id == p.id && r.question_id == *question)
        })
    }

    /// Ends the game, computing and storing the final standings. Legal
    /// only from `Active`; finishing twice is an error, not a no-op.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<&GameSummary, RoomError> {
        match self.status {
            RoomStatus::Active => {}
            RoomStatus::Finished => {
                return Err(RoomError::AlreadyFinished(self.code.clone()));
            }
            RoomStatus::Waiting => {
                return Err(RoomError::InvalidState {
                    op: "finish",
                    status: self.status,
                });
            }
        }
        let standings = leaderboard::rank(&self.players, &self.answered);
        let winner = standings.first().map(|row| row.player_id);
        self.status = RoomStatus::Finished;
        self.finished_at = Some(now);
        self.summary = Some(GameSummary { standings, winner });
        Ok(self.summary.as_ref().expect("just set"))
    }
}
