//! End-to-end matchmaking and battle flows through the public service API

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_test::assert_ok;
use uuid::Uuid;

use duel_arena_server::config::{BattleRules, MatchmakingConfig, RewardRules};
use duel_arena_server::game::session::Submission;
use duel_arena_server::game::{BattleService, SessionHandle};
use duel_arena_server::matchmaking::{MatchmakingService, QueueSubscription};
use duel_arena_server::store::memory::generate_questions;
use duel_arena_server::store::{InMemoryStore, PlayerProfile};
use duel_arena_server::ws::protocol::{
    Action, AnswerOption, MatchErrorKind, MatchId, MatchOutcome, MatchPreferences, QueueEvent, SessionEvent,
};

const QUESTION_COUNT: usize = 40;

fn services(store: Arc<InMemoryStore>, rules: BattleRules) -> (Arc<MatchmakingService>, Arc<BattleService>) {
    let battles = Arc::new(BattleService::new(
        store.clone(),
        store.clone(),
        rules,
        RewardRules::default(),
    ));
    let matchmaking = Arc::new(MatchmakingService::new(
        MatchmakingConfig::default(),
        store.clone(),
        store,
        battles.clone(),
    ));
    (matchmaking, battles)
}

fn answer_key() -> HashMap<Uuid, AnswerOption> {
    generate_questions(QUESTION_COUNT)
        .into_iter()
        .map(|q| (q.id, q.correct))
        .collect()
}

fn wrong(correct: AnswerOption) -> AnswerOption {
    AnswerOption::ALL
        .into_iter()
        .find(|o| *o != correct)
        .unwrap()
}

fn submission(action: Action, answer: AnswerOption, secs: u64, round: u32) -> Submission {
    Submission {
        action,
        answer: Some(answer),
        time_remaining: Duration::from_secs(secs),
        round: Some(round),
    }
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("session went quiet")
        .expect("event channel closed")
}

async fn matched(subscription: &mut QueueSubscription) -> MatchId {
    loop {
        match subscription.recv().await {
            Some(QueueEvent::Searching) => continue,
            Some(QueueEvent::Matched { match_id, .. }) => return match_id,
            other => panic!("unexpected queue event: {:?}", other),
        }
    }
}

async fn confirmed_session(battles: &BattleService, match_id: MatchId) -> (SessionHandle, broadcast::Receiver<SessionEvent>) {
    let handle = battles.session(&match_id).expect("session registered");
    let events = handle.subscribe();
    for player_id in handle.players() {
        assert_ok!(handle.confirm_ready(player_id).await);
    }
    (handle, events)
}

#[tokio::test(start_paused = true)]
async fn test_queue_to_completed_match() {
    let store = Arc::new(InMemoryStore::with_generated_questions(QUESTION_COUNT));
    let (matchmaking, battles) = services(store.clone(), BattleRules::default());
    let key = answer_key();

    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    store.set_profile(a, PlayerProfile { rating: 1000, level: 3 });
    store.set_profile(b, PlayerProfile { rating: 1100, level: 4 });

    let mut sub_a = matchmaking.join_queue(a, MatchPreferences::default()).await.unwrap();
    let mut sub_b = matchmaking.join_queue(b, MatchPreferences::default()).await.unwrap();

    let match_id = matched(&mut sub_a).await;
    assert_eq!(matched(&mut sub_b).await, match_id);
    assert_eq!(matchmaking.queue_size(), 0);
    assert_eq!(matchmaking.current_match(&a), Some(match_id));
    assert_eq!(store.matches().len(), 1);

    let (handle, mut events) = confirmed_session(&battles, match_id).await;
    assert_eq!(handle.opponent_of(&a).map(|o| o.rating), Some(1100));

    // Same action every round: only `a` answers correctly, so `a` lands a full hit
    let outcome: MatchOutcome = loop {
        match next_event(&mut events).await {
            SessionEvent::RoundStarted { round, question, .. } => {
                let correct = key[&question.id];
                assert_ok!(handle.submit_round(a, submission(Action::Strike, correct, 20, round)).await);
                assert_ok!(
                    handle
                        .submit_round(b, submission(Action::Strike, wrong(correct), 25, round))
                        .await
                );
            }
            SessionEvent::MatchCompleted { outcome } => break outcome,
            SessionEvent::MatchError { reason, .. } => panic!("match failed: {}", reason),
            _ => {}
        }
    };

    assert_eq!(outcome.winner_id, Some(a));
    assert_eq!(outcome.rounds_played, 5);
    let totals: HashMap<_, _> = outcome.final_scores.iter().map(|t| (t.player_id, t)).collect();
    // ceil(20 / 30 * 20) = 14 per round
    assert_eq!(totals[&b].health, 30);
    assert_eq!(totals[&a].health, 100);
    assert_eq!(totals[&a].score, 5);
    assert_eq!(totals[&a].best_streak, 5);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.outcomes().len(), 1);
    let (rating_a, rating_b) = (store.rating(&a).unwrap(), store.rating(&b).unwrap());
    assert!(rating_a > 1000);
    assert_eq!(rating_a + rating_b, 2100);
    assert!(battles.session(&match_id).is_none());
    assert!(matchmaking.current_match(&a).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_match_still_completes() {
    let store = Arc::new(InMemoryStore::with_generated_questions(QUESTION_COUNT));
    let (matchmaking, battles) = services(store.clone(), BattleRules::default());
    let key = answer_key();

    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut sub_a = matchmaking.join_queue(a, MatchPreferences::default()).await.unwrap();
    let _sub_b = matchmaking.join_queue(b, MatchPreferences::default()).await.unwrap();
    let match_id = matched(&mut sub_a).await;

    let (handle, mut events) = confirmed_session(&battles, match_id).await;

    let outcome = loop {
        match next_event(&mut events).await {
            SessionEvent::RoundStarted { round, question, .. } => {
                let correct = key[&question.id];
                assert_ok!(handle.submit_round(a, submission(Action::Strike, correct, 30, round)).await);
                if round < 2 {
                    assert_ok!(
                        handle
                            .submit_round(b, submission(Action::Strike, wrong(correct), 30, round))
                            .await
                    );
                }
            }
            SessionEvent::RoundResolved { result, .. } if result.round == 1 => {
                // `b` drops after the second round
                assert_ok!(handle.disconnect(b).await);
            }
            SessionEvent::MatchCompleted { outcome } => break outcome,
            SessionEvent::MatchError { reason, .. } => panic!("match failed: {}", reason),
            _ => {}
        }
    };

    assert_eq!(outcome.winner_id, Some(a));
    assert_eq!(outcome.forfeited_by, None);
    assert!(outcome.rounds_played >= 3);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.outcomes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_practice_bot_match_is_unrated() {
    let store = Arc::new(InMemoryStore::with_generated_questions(QUESTION_COUNT));
    let (matchmaking, _battles) = services(store.clone(), BattleRules::default());
    let key = answer_key();

    let player = Uuid::new_v4();
    let (handle, mut events) = matchmaking
        .practice_bot(player, MatchPreferences::default())
        .await
        .unwrap()
        .into_seat(&player);
    assert_eq!(handle.opponent_of(&player).map(|o| o.is_bot), Some(true));

    assert_ok!(handle.confirm_ready(player).await);

    let outcome = loop {
        match next_event(&mut events).await {
            SessionEvent::RoundStarted { round, question, .. } => {
                let correct = key[&question.id];
                assert_ok!(
                    handle
                        .submit_round(player, submission(Action::Guard, correct, 15, round))
                        .await
                );
            }
            SessionEvent::MatchCompleted { outcome } => break outcome,
            SessionEvent::MatchError { reason, .. } => panic!("match failed: {}", reason),
            _ => {}
        }
    };

    assert!(outcome.rewards.iter().all(|r| r.rating_delta == 0));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(store.rating(&player).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_double_match() {
    const PLAYERS: usize = 20;

    let store = Arc::new(InMemoryStore::with_generated_questions(QUESTION_COUNT));
    let (matchmaking, _battles) = services(store.clone(), BattleRules::default());

    let joins: Vec<_> = (0..PLAYERS)
        .map(|_| {
            let matchmaking = matchmaking.clone();
            tokio::spawn(async move {
                let player_id = Uuid::new_v4();
                let subscription = matchmaking
                    .join_queue(player_id, MatchPreferences::default())
                    .await
                    .unwrap();
                (player_id, subscription)
            })
        })
        .collect();

    let mut assignments: HashMap<Uuid, MatchId> = HashMap::new();
    for join in joins {
        let (player_id, mut subscription) = join.await.unwrap();
        let match_id = tokio::time::timeout(Duration::from_secs(5), matched(&mut subscription))
            .await
            .expect("player was never matched");
        assert!(assignments.insert(player_id, match_id).is_none());
    }

    let mut per_match: HashMap<MatchId, usize> = HashMap::new();
    for match_id in assignments.values() {
        *per_match.entry(*match_id).or_default() += 1;
    }
    assert_eq!(per_match.len(), PLAYERS / 2);
    assert!(per_match.values().all(|n| *n == 2));

    let recorded = store.matches();
    assert_eq!(recorded.len(), PLAYERS / 2);
    let seated: HashSet<Uuid> = recorded.iter().flat_map(|m| m.player_ids()).collect();
    assert_eq!(seated.len(), PLAYERS);
    assert_eq!(matchmaking.queue_size(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_question_shortfall_reaches_matched_players() {
    let store = Arc::new(InMemoryStore::with_generated_questions(2));
    let (matchmaking, battles) = services(store, BattleRules::default());

    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut sub_a = matchmaking.join_queue(a, MatchPreferences::default()).await.unwrap();
    let mut sub_b = matchmaking.join_queue(b, MatchPreferences::default()).await.unwrap();

    let match_id = matched(&mut sub_a).await;
    assert_eq!(matched(&mut sub_b).await, match_id);

    for subscription in [&mut sub_a, &mut sub_b] {
        let mut events = subscription
            .take_session_events()
            .expect("matched subscription carries the session stream");
        match next_event(&mut events).await {
            SessionEvent::MatchError { kind, retryable, .. } => {
                assert_eq!(kind, MatchErrorKind::QuestionSupplyShortfall);
                assert!(!retryable);
            }
            other => panic!("expected a shortfall error, got {:?}", other),
        }
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(battles.session(&match_id).is_none());
    assert!(matchmaking.current_match(&a).is_none());
    assert!(matchmaking.current_match(&b).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_players_requeue_while_outcome_write_keeps_failing() {
    let rules = BattleRules {
        forfeit_on_disconnect: true,
        persist_retry_window: Duration::from_secs(120),
        ..BattleRules::default()
    };
    let store = Arc::new(InMemoryStore::with_generated_questions(QUESTION_COUNT));
    store.fail_next_outcome_writes(100);
    let (matchmaking, battles) = services(store.clone(), rules);

    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut sub_a = matchmaking.join_queue(a, MatchPreferences::default()).await.unwrap();
    let _sub_b = matchmaking.join_queue(b, MatchPreferences::default()).await.unwrap();
    let match_id = matched(&mut sub_a).await;

    let (handle, mut events) = confirmed_session(&battles, match_id).await;
    assert_ok!(handle.disconnect(b).await);

    loop {
        match next_event(&mut events).await {
            SessionEvent::MatchError { retryable, .. } => {
                assert!(retryable);
                break;
            }
            SessionEvent::MatchCompleted { .. } => panic!("outcome should not persist"),
            _ => {}
        }
    }
    assert!(matchmaking.current_match(&b).is_none());
    let _requeued = assert_ok!(matchmaking.join_queue(b, MatchPreferences::default()).await);
    assert!(matchmaking.is_in_queue(&b));

    loop {
        match next_event(&mut events).await {
            SessionEvent::MatchError {
                kind,
                retryable: false,
                ..
            } => {
                assert_eq!(kind, MatchErrorKind::PersistenceFailure);
                break;
            }
            SessionEvent::MatchCompleted { .. } => panic!("outcome should not persist"),
            _ => {}
        }
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(battles.session(&match_id).is_none());
    assert!(store.outcomes().is_empty());
}
