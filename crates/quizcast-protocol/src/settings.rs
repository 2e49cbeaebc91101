//! Room settings: question count, player limit, category selection.
//!
//! Categories form a closed set keyed by [`Category`], each carrying a
//! tagged [`CategorySetting`] — never an open map of untyped values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Question difficulty within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// The closed set of question categories the catalog serves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    Science,
    History,
    Geography,
    Sports,
    Entertainment,
    Music,
    Film,
}

impl Category {
    /// All known categories, in stable order.
    pub const ALL: [Category; 8] = [
        Category::General,
        Category::Science,
        Category::History,
        Category::Geography,
        Category::Sports,
        Category::Entertainment,
        Category::Music,
        Category::Film,
    ];
}

/// Per-category configuration inside a room's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySetting {
    pub enabled: bool,
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// Bounds enforced by [`RoomSettings::validate`].
pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 50;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 16;

/// A room's configuration, fixed by the host at creation time and
/// editable only while the room is still waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    /// How many questions the game draws from the enabled categories.
    pub question_count: usize,

    /// Hard cap on room membership.
    pub max_players: usize,

    /// Category selection. `BTreeMap` keeps iteration order stable so
    /// question picking and snapshots are deterministic.
    pub categories: BTreeMap<Category, CategorySetting>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::General,
            CategorySetting {
                enabled: true,
                difficulty: Difficulty::Medium,
            },
        );
        Self {
            question_count: 10,
            max_players: 8,
            categories,
        }
    }
}

/// Validation failures for submitted settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("question_count must be {MIN_QUESTIONS}..={MAX_QUESTIONS}, got {0}")]
    QuestionCount(usize),

    #[error("max_players must be {MIN_PLAYERS}..={MAX_PLAYERS}, got {0}")]
    MaxPlayers(usize),

    #[error("at least one category must be enabled")]
    NoCategories,
}

impl RoomSettings {
    /// Checks the settings against the documented bounds.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&self.question_count) {
            return Err(SettingsError::QuestionCount(self.question_count));
        }
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.max_players) {
            return Err(SettingsError::MaxPlayers(self.max_players));
        }
        if self.enabled_categories().next().is_none() {
            return Err(SettingsError::NoCategories);
        }
        Ok(())
    }

    /// Iterates the enabled categories with their difficulty.
    pub fn enabled_categories(
        &self,
    ) -> impl Iterator<Item = (Category, Difficulty)> + '_ {
        self.categories
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(c, s)| (*c, s.difficulty))
    }
}
