//! Seam to the external question/deck catalog.
//!
//! The catalog's content and storage are someone else's problem; the
//! room domain only needs two opaque reads — pick question ids for a
//! settings selection, and look up a question's correct option.

use std::collections::HashMap;
use std::future::Future;

use quizcast_protocol::{Category, Difficulty, QuestionId, RoomSettings};

/// Failures from the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// The catalog does not know this question.
    #[error("unknown question {0}")]
    UnknownQuestion(QuestionId),

    /// The enabled categories cannot supply the requested count.
    #[error("only {available} questions available for the selected categories, need {requested}")]
    InsufficientQuestions { available: usize, requested: usize },

    /// The catalog backend failed.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to the question catalog.
///
/// Declared with `impl Future + Send` returns so service futures stay
/// spawnable when generic over the catalog; implementations write plain
/// `async fn`.
pub trait QuestionCatalog: Send + Sync + 'static {
    /// Picks `settings.question_count` question ids across the enabled
    /// categories. The returned order becomes the room's fixed question
    /// sequence.
    fn pick_questions(
        &self,
        settings: &RoomSettings,
    ) -> impl Future<Output = Result<Vec<QuestionId>, CatalogError>> + Send;

    /// Returns the correct option index for a question.
    fn correct_option(
        &self,
        question: QuestionId,
    ) -> impl Future<Output = Result<u8, CatalogError>> + Send;
}

/// A fixed in-memory catalog.
///
/// Serves development and tests; a production deployment implements
/// [`QuestionCatalog`] against the real content service.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    bank: Vec<BankEntry>,
    answers: HashMap<QuestionId, u8>,
}

#[derive(Debug)]
struct BankEntry {
    id: QuestionId,
    category: Category,
    difficulty: Difficulty,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a question to the bank.
    pub fn add(
        &mut self,
        id: QuestionId,
        category: Category,
        difficulty: Difficulty,
        correct_option: u8,
    ) -> &mut Self {
        self.bank.push(BankEntry {
            id,
            category,
            difficulty,
        });
        self.answers.insert(id, correct_option);
        self
    }

    /// A catalog with `per_category` questions in every known category
    /// and difficulty, all with correct option 0. Handy in tests.
    pub fn uniform(per_category: usize) -> Self {
        let mut catalog = Self::new();
        let mut next_id = 1u64;
        for category in Category::ALL {
            for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
                for _ in 0..per_category {
                    catalog.add(QuestionId(next_id), category, difficulty, 0);
                    next_id += 1;
                }
            }
        }
        catalog
    }
}

impl QuestionCatalog for StaticCatalog {
    async fn pick_questions(
        &self,
        settings: &RoomSettings,
    ) -> Result<Vec<QuestionId>, CatalogError> {
        let enabled: Vec<(Category, Difficulty)> =
            settings.enabled_categories().collect();

        let matching: Vec<QuestionId> = self
            .bank
            .iter()
            .filter(|entry| {
                enabled
                    .iter()
                    .any(|(c, d)| entry.category == *c && entry.difficulty == *d)
            })
            .map(|entry| entry.id)
            .collect();

        if matching.len() < settings.question_count {
            return Err(CatalogError::InsufficientQuestions {
                available: matching.len(),
                requested: settings.question_count,
            });
        }
        Ok(matching[..settings.question_count].to_vec())
    }

    async fn correct_option(&self, question: QuestionId) -> Result<u8, CatalogError> {
        self.answers
            .get(&question)
            .copied()
            .ok_or(CatalogError::UnknownQuestion(question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizcast_protocol::CategorySetting;

    fn settings_with(categories: &[(Category, Difficulty)], count: usize) -> RoomSettings {
        let mut settings = RoomSettings {
            question_count: count,
            ..RoomSettings::default()
        };
        settings.categories.clear();
        for (category, difficulty) in categories {
            settings.categories.insert(
                *category,
                CategorySetting {
                    enabled: true,
                    difficulty: *difficulty,
                },
            );
        }
        settings
    }

    #[tokio::test]
    async fn test_pick_questions_honors_count_and_categories() {
        let catalog = StaticCatalog::uniform(5);
        let settings = settings_with(
            &[
                (Category::Science, Difficulty::Medium),
                (Category::History, Difficulty::Medium),
            ],
            5,
        );

        let picked = catalog.pick_questions(&settings).await.unwrap();
        assert_eq!(picked.len(), 5);
    }

    #[tokio::test]
    async fn test_pick_questions_fails_when_bank_too_small() {
        let catalog = StaticCatalog::uniform(1);
        let settings =
            settings_with(&[(Category::Music, Difficulty::Hard)], 5);

        let result = catalog.pick_questions(&settings).await;
        assert_eq!(
            result,
            Err(CatalogError::InsufficientQuestions {
                available: 1,
                requested: 5
            })
        );
    }

    #[tokio::test]
    async fn test_correct_option_unknown_question() {
        let catalog = StaticCatalog::new();
        assert_eq!(
            catalog.correct_option(QuestionId(99)).await,
            Err(CatalogError::UnknownQuestion(QuestionId(99)))
        );
    }
}
