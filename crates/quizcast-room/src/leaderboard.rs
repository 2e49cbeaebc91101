//! Standings computation.

use quizcast_protocol::{LeaderboardRow, PlayerId};

use crate::model::{AnswerRecord, Player};

/// Ranks the given members by their answer history.
///
/// Order is total score descending, then accuracy descending, then
/// average answer time ascending (faster wins). The sort is stable, so
/// players tied on all three keep join order.
pub fn rank(players: &[Player], answered: &[AnswerRecord]) -> Vec<LeaderboardRow> {
    let mut rows: Vec<LeaderboardRow> = players
        .iter()
        .map(|player| row_for(player, answered))
        .collect();
    rows.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.accuracy.total_cmp(&a.accuracy))
            .then(a.avg_time_ms.total_cmp(&b.avg_time_ms))
    });
    rows
}

fn row_for(player: &Player, answered: &[AnswerRecord]) -> LeaderboardRow {
    let mine: Vec<&AnswerRecord> = answered
        .iter()
        .filter(|r| r.player_id == player.id)
        .collect();
    let answered_count = mine.len();
    let correct = mine.iter().filter(|r| r.is_correct).count();
    let (accuracy, avg_time_ms) = if answered_count == 0 {
        (0.0, 0.0)
    } else {
        let total_ms: u64 = mine.iter().map(|r| r.time_taken_ms).sum();
        (
            // Percentage, not a fraction: clients show this directly.
            100.0 * correct as f64 / answered_count as f64,
            total_ms as f64 / answered_count as f64,
        )
    };
    LeaderboardRow {
        player_id: player.id,
        name: player.name.clone(),
        score: player.score,
        correct,
        answered: answered_count,
        accuracy,
        avg_time_ms,
    }
}
