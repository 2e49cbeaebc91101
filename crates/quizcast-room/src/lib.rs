//! Room domain for Quizcast: the aggregate, its state machine, scoring,
//! and room-code allocation.
//!
//! # Key types
//!
//! - [`Room`] — the aggregate root; pure state-machine methods enforce
//!   every lifecycle rule
//! - [`RoomLifecycle`] — transactional service running those methods
//!   through the store, one transaction per room mutation
//! - [`AnswerProcessor`] — answer validation, scoring, round advancement
//! - [`CodeAllocator`] / [`RetryPolicy`] — unique short-code generation
//!   with bounded retry and backoff
//! - [`QuestionCatalog`] — seam to the external question/deck catalog

mod answers;
mod catalog;
mod code;
mod error;
mod leaderboard;
mod lifecycle;
mod model;

pub use answers::AnswerProcessor;
pub use catalog::{CatalogError, QuestionCatalog, StaticCatalog};
pub use code::{AllocError, CodeAllocator, RetryPolicy};
pub use error::{RoomError, ServiceError};
pub use leaderboard::rank;
pub use lifecycle::RoomLifecycle;
pub use model::{
    AnswerOutcome, AnswerRecord, MIN_PLAYERS_TO_START, NewPlayer, Player, Removal, Room,
    RoomCache, POINTS_PER_CORRECT,
};
