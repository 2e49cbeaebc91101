//! Wire protocol for Quizcast.
//!
//! This crate defines the vocabulary shared by every layer:
//!
//! - **Identity** ([`PlayerId`], [`QuestionId`], [`TaskId`], [`RoomCode`]) —
//!   newtype ids that travel on the wire and key the domain maps.
//! - **Settings** ([`RoomSettings`], [`Category`], [`Difficulty`]) — the
//!   validated room configuration clients submit at creation time.
//! - **Snapshots** ([`RoomSnapshot`], [`PlayerSnapshot`], [`LeaderboardRow`])
//!   — the read-only views sent to clients.
//! - **Events** ([`ClientEvent`], [`ServerEvent`], [`Reply`], [`ErrorCode`])
//!   — the bidirectional real-time surface.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages become bytes.
//!
//! The protocol layer knows nothing about connections, rooms, or storage —
//! it only defines shapes and their serialization.

mod codec;
mod error;
mod events;
mod ids;
mod settings;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{
    ClientEvent, ErrorBody, ErrorCode, RemovalReason, Reply, ServerEvent,
};
pub use ids::{
    CODE_ALPHABET, CODE_LEN, PlayerId, QuestionId, RoomCode, RoomCodeError, TaskId,
    code_from_alphabet,
};
pub use settings::{
    Category, CategorySetting, Difficulty, MAX_PLAYERS, MAX_QUESTIONS, MIN_PLAYERS,
    MIN_QUESTIONS, RoomSettings, SettingsError,
};
pub use types::{
    GameSummary, LeaderboardRow, PlayerSnapshot, RoomSnapshot, RoomStatus,
};
