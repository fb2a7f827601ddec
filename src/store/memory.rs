//! In-process collaborators for local runs and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::game::Match;
use crate::ws::protocol::{AnswerOption, Difficulty, MatchOutcome, PlayerId};

use super::questions::{Question, QuestionFilter};
use super::{MatchRecorder, PlayerProfile, ProfileStore, QuestionBank, StoreError};

/// Question bank, profile store and match recorder held in memory.
///
/// The `fail_*` counters make the next N calls of an operation fail, which
/// is how tests exercise the persistence failure paths.
#[derive(Default)]
pub struct InMemoryStore {
    questions: Mutex<Vec<Question>>,
    profiles: Mutex<HashMap<PlayerId, PlayerProfile>>,
    matches: Mutex<Vec<Match>>,
    outcomes: Mutex<Vec<MatchOutcome>>,
    ratings: Mutex<HashMap<PlayerId, i32>>,
    fail_match_creations: AtomicU32,
    fail_outcome_writes: AtomicU32,
    fail_rating_writes: AtomicU32,
    outcome_writes: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        let store = Self::new();
        *store.questions.lock() = questions;
        store
    }

    /// A store seeded with `count` generated arithmetic questions
    pub fn with_generated_questions(count: usize) -> Self {
        Self::with_questions(generate_questions(count))
    }

    pub fn set_profile(&self, player_id: PlayerId, profile: PlayerProfile) {
        self.profiles.lock().insert(player_id, profile);
    }

    pub fn fail_next_match_creations(&self, count: u32) {
        self.fail_match_creations.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_outcome_writes(&self, count: u32) {
        self.fail_outcome_writes.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_rating_writes(&self, count: u32) {
        self.fail_rating_writes.store(count, Ordering::SeqCst);
    }

    /// Successful `record_outcome` calls so far
    pub fn outcome_writes(&self) -> u32 {
        self.outcome_writes.load(Ordering::SeqCst)
    }

    pub fn matches(&self) -> Vec<Match> {
        self.matches.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<MatchOutcome> {
        self.outcomes.lock().clone()
    }

    pub fn rating(&self, player_id: &PlayerId) -> Option<i32> {
        self.ratings.lock().get(player_id).copied()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl QuestionBank for InMemoryStore {
    fn fetch_questions<'a>(
        &'a self,
        filter: &'a QuestionFilter,
        count: usize,
    ) -> BoxFuture<'a, Result<Vec<Question>, StoreError>> {
        let selected: Vec<Question> = self
            .questions
            .lock()
            .iter()
            .filter(|q| filter.matches(q))
            .take(count)
            .cloned()
            .collect();
        Box::pin(async move { Ok(selected) })
    }
}

impl ProfileStore for InMemoryStore {
    fn rating_and_level(&self, player_id: PlayerId) -> BoxFuture<'_, Result<PlayerProfile, StoreError>> {
        let profile = *self.profiles.lock().entry(player_id).or_default();
        Box::pin(async move { Ok(profile) })
    }
}

impl MatchRecorder for InMemoryStore {
    fn create_match<'a>(&'a self, created: &'a Match) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if Self::take_failure(&self.fail_match_creations) {
                return Err(StoreError::Unavailable("match insert rejected".to_string()));
            }
            self.matches.lock().push(created.clone());
            Ok(())
        })
    }

    fn record_outcome<'a>(&'a self, outcome: &'a MatchOutcome) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if Self::take_failure(&self.fail_outcome_writes) {
                return Err(StoreError::Unavailable("outcome insert rejected".to_string()));
            }
            let mut outcomes = self.outcomes.lock();
            outcomes.retain(|o| o.match_id != outcome.match_id);
            outcomes.push(outcome.clone());
            self.outcome_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn upsert_rating(&self, player_id: PlayerId, rating: i32) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if Self::take_failure(&self.fail_rating_writes) {
                return Err(StoreError::Unavailable("rating upsert rejected".to_string()));
            }
            self.ratings.lock().insert(player_id, rating);
            if let Some(profile) = self.profiles.lock().get_mut(&player_id) {
                profile.rating = rating;
            }
            Ok(())
        })
    }
}

/// Deterministic arithmetic questions cycling through the difficulties
pub fn generate_questions(count: usize) -> Vec<Question> {
    (0..count)
        .map(|i| {
            let (difficulty, a, b) = match i % 3 {
                0 => (Difficulty::Easy, 2 + i as i64, 3 + i as i64),
                1 => (Difficulty::Medium, 12 + 3 * i as i64, 27 + 2 * i as i64),
                _ => (Difficulty::Hard, 113 + 7 * i as i64, 289 + 5 * i as i64),
            };
            let answer = a + b;
            let correct = AnswerOption::ALL[i % 4];
            let mut options: [String; 4] = Default::default();
            for (slot, option) in options.iter_mut().enumerate() {
                let offset = slot as i64 - (i % 4) as i64;
                *option = (answer + offset * 10).to_string();
            }
            Question {
                id: Uuid::from_u128(0x5155_0000_0000_0000_0000_0000_0000_0000 + i as u128),
                prompt: format!("What is {} + {}?", a, b),
                options,
                correct,
                difficulty,
                category: "arithmetic".to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_generated_questions_mark_the_right_option() {
        for q in generate_questions(12) {
            let idx = AnswerOption::ALL.iter().position(|o| *o == q.correct).unwrap();
            let sum: i64 = q
                .prompt
                .trim_start_matches("What is ")
                .trim_end_matches('?')
                .split(" + ")
                .map(|n| n.parse::<i64>().unwrap())
                .sum();
            assert_eq!(q.options[idx], sum.to_string());
        }
    }

    #[tokio::test]
    async fn test_fetch_may_return_fewer_than_requested() {
        let store = InMemoryStore::with_generated_questions(3);
        let got = store.fetch_questions(&QuestionFilter::default(), 5).await;
        assert_eq!(assert_ok!(got).len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_profile_gets_defaults() {
        let store = InMemoryStore::new();
        let profile = assert_ok!(store.rating_and_level(Uuid::new_v4()).await);
        assert_eq!(profile, PlayerProfile::default());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = InMemoryStore::new();
        store.fail_next_outcome_writes(1);
        let outcome = MatchOutcome {
            match_id: Uuid::new_v4(),
            winner_id: None,
            forfeited_by: None,
            final_scores: vec![],
            rewards: vec![],
            rounds_played: 0,
            completed_at: chrono::Utc::now(),
        };
        assert_err!(store.record_outcome(&outcome).await);
        assert_ok!(store.record_outcome(&outcome).await);
        assert_ok!(store.record_outcome(&outcome).await);
        assert_eq!(store.outcomes().len(), 1);
    }
}
