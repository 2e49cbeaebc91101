//! End-to-end exercises of the room services over the in-memory store:
//! create, join, ready, start, answer, and finish, plus the failure
//! paths a gateway has to surface.

use std::collections::HashSet;
use std::sync::Arc;

use quizcast_protocol::{
    PlayerId, QuestionId, RoomCode, RoomSettings, RoomStatus, CODE_LEN,
};
use quizcast_room::{
    AnswerProcessor, NewPlayer, Room, RoomError, RoomLifecycle, ServiceError,
    StaticCatalog, POINTS_PER_CORRECT,
};
use quizcast_store::{Cache, CacheConfig, MemoryStore};

type RoomStore = MemoryStore<RoomCode, Room>;

struct Fixture {
    lifecycle: RoomLifecycle<RoomStore, StaticCatalog>,
    answers: AnswerProcessor<RoomStore, StaticCatalog>,
}

fn fixture() -> Fixture {
    let store = Arc::new(RoomStore::new());
    let cache = Arc::new(Cache::new(store, CacheConfig::default()));
    let catalog = Arc::new(StaticCatalog::uniform(20));
    Fixture {
        lifecycle: RoomLifecycle::new(Arc::clone(&cache), Arc::clone(&catalog)),
        answers: AnswerProcessor::new(cache, catalog),
    }
}

fn profile(id: u64) -> NewPlayer {
    NewPlayer {
        id: PlayerId(id),
        name: format!("player-{id}"),
        avatar: None,
    }
}

fn settings(question_count: usize) -> RoomSettings {
    RoomSettings {
        question_count,
        ..RoomSettings::default()
    }
}

/// Creates a room, joins player 2, readies them, and starts the game.
async fn started_room(fx: &Fixture, question_count: usize) -> RoomCode {
    let snap = fx
        .lifecycle
        .create_room(profile(1), Some(settings(question_count)))
        .await
        .unwrap();
    let code = snap.code;
    fx.lifecycle.join(&code, profile(2)).await.unwrap();
    fx.lifecycle
        .set_ready(&code, PlayerId(2), true)
        .await
        .unwrap();
    fx.lifecycle.start(&code, PlayerId(1)).await.unwrap();
    code
}

#[tokio::test]
async fn test_create_room_yields_waiting_room_with_host() {
    let fx = fixture();
    let snap = fx
        .lifecycle
        .create_room(profile(1), Some(settings(5)))
        .await
        .unwrap();

    assert_eq!(snap.status, RoomStatus::Waiting);
    assert_eq!(snap.code.as_str().len(), CODE_LEN);
    assert_eq!(snap.host_id, PlayerId(1));
    assert_eq!(snap.players.len(), 1);
    assert_eq!(snap.question_ids.len(), 5);
}

#[tokio::test]
async fn test_create_room_rejects_invalid_settings() {
    let fx = fixture();
    let result = fx
        .lifecycle
        .create_room(profile(1), Some(settings(0)))
        .await;
    assert!(matches!(result, Err(ServiceError::Settings(_))));
}

#[tokio::test]
async fn test_created_codes_are_distinct() {
    let fx = fixture();
    let mut codes = HashSet::new();
    for id in 1..=30 {
        let snap = fx
            .lifecycle
            .create_room(profile(id), Some(settings(3)))
            .await
            .unwrap();
        assert!(codes.insert(snap.code), "duplicate room code allocated");
    }
}

#[tokio::test]
async fn test_join_unknown_code_is_not_found() {
    let fx = fixture();
    let code = RoomCode::parse("ZZZZ99").unwrap();
    let result = fx.lifecycle.join(&code, profile(2)).await;
    assert!(matches!(
        result,
        Err(ServiceError::Room(RoomError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_join_after_start_rejected() {
    let fx = fixture();
    let code = started_room(&fx, 3).await;
    let result = fx.lifecycle.join(&code, profile(3)).await;
    assert!(matches!(
        result,
        Err(ServiceError::Room(RoomError::InvalidState { .. }))
    ));
}

#[tokio::test]
async fn test_host_leave_promotes_and_kick_requires_host() {
    let fx = fixture();
    let snap = fx
        .lifecycle
        .create_room(profile(1), Some(settings(3)))
        .await
        .unwrap();
    let code = snap.code;
    fx.lifecycle.join(&code, profile(2)).await.unwrap();
    fx.lifecycle.join(&code, profile(3)).await.unwrap();

    let (removal, snap) = fx.lifecycle.leave(&code, PlayerId(1)).await.unwrap();
    assert_eq!(removal.new_host, Some(PlayerId(2)));
    assert_eq!(snap.host_id, PlayerId(2));

    // Former member is no longer allowed to kick.
    let result = fx.lifecycle.kick(&code, PlayerId(3), PlayerId(2)).await;
    assert!(matches!(
        result,
        Err(ServiceError::Room(RoomError::NotHost(_)))
    ));

    let (_, snap) = fx
        .lifecycle
        .kick(&code, PlayerId(2), PlayerId(3))
        .await
        .unwrap();
    assert_eq!(snap.players.len(), 1);
}

#[tokio::test]
async fn test_emptied_room_is_deleted() {
    let fx = fixture();
    let snap = fx
        .lifecycle
        .create_room(profile(1), Some(settings(3)))
        .await
        .unwrap();
    let code = snap.code;

    let (removal, _) = fx.lifecycle.leave(&code, PlayerId(1)).await.unwrap();
    assert!(removal.finished);

    let result = fx.lifecycle.snapshot(&code).await;
    assert!(matches!(
        result,
        Err(ServiceError::Room(RoomError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_full_game_two_questions() {
    let fx = fixture();
    let code = started_room(&fx, 2).await;
    let snap = fx.lifecycle.snapshot(&code).await.unwrap();
    let &[q1, q2] = &snap.question_ids[..] else {
        panic!("expected two questions");
    };

    // Round one: player 1 correct, player 2 wrong.
    let (o, _) = fx.answers.submit(&code, PlayerId(1), q1, 0, 900).await.unwrap();
    assert!(o.is_correct);
    assert!(!o.round_complete);
    let (o, _) = fx.answers.submit(&code, PlayerId(2), q1, 3, 700).await.unwrap();
    assert!(!o.is_correct);
    assert!(o.round_complete);
    assert!(!o.game_over);

    let snap = fx.lifecycle.snapshot(&code).await.unwrap();
    assert_eq!(snap.current_question_index, 1);

    // Round two: both correct; game finishes on the last submission.
    fx.answers.submit(&code, PlayerId(1), q2, 0, 800).await.unwrap();
    let (o, room) = fx.answers.submit(&code, PlayerId(2), q2, 0, 600).await.unwrap();
    assert!(o.round_complete);
    assert!(o.game_over);
    assert_eq!(room.status, RoomStatus::Finished);

    let summary = room.summary.expect("summary stored on finish");
    assert_eq!(summary.winner, Some(PlayerId(1)));
    assert_eq!(summary.standings[0].score, 2 * POINTS_PER_CORRECT);
    assert_eq!(summary.standings[1].score, POINTS_PER_CORRECT);
}

#[tokio::test]
async fn test_duplicate_submission_is_conflict() {
    let fx = fixture();
    let code = started_room(&fx, 3).await;
    let snap = fx.lifecycle.snapshot(&code).await.unwrap();
    let q = snap.question_ids[0];

    fx.answers.submit(&code, PlayerId(1), q, 0, 500).await.unwrap();
    let result = fx.answers.submit(&code, PlayerId(1), q, 1, 200).await;
    assert!(matches!(
        result,
        Err(ServiceError::Room(RoomError::DuplicateAnswer(_, _)))
    ));
}

#[tokio::test]
async fn test_submission_for_foreign_question_rejected() {
    let fx = fixture();
    let code = started_room(&fx, 3).await;

    // A question the catalog knows but this game does not include.
    let snap = fx.lifecycle.snapshot(&code).await.unwrap();
    let foreign = (1..)
        .map(QuestionId)
        .find(|q| !snap.question_ids.contains(q))
        .unwrap();

    let result = fx
        .answers
        .submit(&code, PlayerId(1), foreign, 0, 500)
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::Room(RoomError::UnknownQuestion(_)))
    ));
}

#[tokio::test]
async fn test_leaderboard_reflects_scores() {
    let fx = fixture();
    let code = started_room(&fx, 2).await;
    let snap = fx.lifecycle.snapshot(&code).await.unwrap();
    let q = snap.question_ids[0];

    fx.answers.submit(&code, PlayerId(1), q, 3, 900).await.unwrap();
    fx.answers.submit(&code, PlayerId(2), q, 0, 400).await.unwrap();

    let rows = fx.answers.leaderboard(&code, q).await.unwrap();
    assert_eq!(rows[0].player_id, PlayerId(2));
    assert_eq!(rows[0].score, POINTS_PER_CORRECT);
    assert_eq!(rows[1].score, 0);
}

#[tokio::test]
async fn test_finish_early_and_finish_twice() {
    let fx = fixture();
    let code = started_room(&fx, 5).await;

    let (summary, snap) = fx.lifecycle.finish(&code).await.unwrap();
    assert_eq!(snap.status, RoomStatus::Finished);
    assert_eq!(summary.standings.len(), 2);

    let result = fx.lifecycle.finish(&code).await;
    assert!(matches!(
        result,
        Err(ServiceError::Room(RoomError::AlreadyFinished(_)))
    ));
}

#[tokio::test]
async fn test_settings_update_redraws_questions() {
    let fx = fixture();
    let snap = fx
        .lifecycle
        .create_room(profile(1), Some(settings(3)))
        .await
        .unwrap();
    let code = snap.code;

    let updated = fx
        .lifecycle
        .update_settings(&code, PlayerId(1), settings(7))
        .await
        .unwrap();
    assert_eq!(updated.question_ids.len(), 7);
    assert_eq!(updated.settings.question_count, 7);
}

#[tokio::test]
async fn test_concurrent_joins_respect_capacity() {
    let fx = Arc::new(fixture());
    let snap = fx
        .lifecycle
        .create_room(
            profile(1),
            Some(RoomSettings {
                max_players: 4,
                ..settings(3)
            }),
        )
        .await
        .unwrap();
    let code = snap.code;

    let mut handles = Vec::new();
    for id in 2..=12 {
        let fx = Arc::clone(&fx);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            fx.lifecycle.join(&code, profile(id)).await.is_ok()
        }));
    }
    let mut joined = 0;
    for handle in handles {
        if handle.await.unwrap() {
            joined += 1;
        }
    }

    assert_eq!(joined, 3, "exactly the free seats were won");
    let snap = fx.lifecycle.snapshot(&code).await.unwrap();
    assert_eq!(snap.players.len(), 4);
}
