//! Practice opponent

use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::store::questions::Question;
use crate::ws::protocol::{Action, AnswerOption};

use super::session::Submission;
use super::{MatchPlayer, PlayerKind};

/// Share of the round clock a bot leaves unused, in percent
const MIN_TIME_LEFT_PERCENT: u64 = 10;
const MAX_TIME_LEFT_PERCENT: u64 = 80;

/// A bot seat rated like the human it faces
pub fn opponent_for(human: &MatchPlayer, accuracy_percent: u32) -> MatchPlayer {
    MatchPlayer {
        player_id: Uuid::new_v4(),
        rating: human.rating,
        level: human.level,
        kind: PlayerKind::Bot {
            accuracy_percent: accuracy_percent.min(100),
        },
    }
}

/// Pick a random action and answer the question correctly with
/// `accuracy_percent` odds
pub fn submission<R: Rng + ?Sized>(
    rng: &mut R,
    question: &Question,
    accuracy_percent: u32,
    time_limit: Duration,
    round: u32,
) -> Submission {
    let action = Action::ALL[rng.gen_range(0..Action::ALL.len())];

    let answer = if rng.gen_range(0..100) < accuracy_percent {
        question.correct
    } else {
        let wrong: Vec<AnswerOption> = AnswerOption::ALL
            .into_iter()
            .filter(|o| *o != question.correct)
            .collect();
        wrong[rng.gen_range(0..wrong.len())]
    };

    let percent = rng.gen_range(MIN_TIME_LEFT_PERCENT..=MAX_TIME_LEFT_PERCENT);
    let time_remaining = time_limit * percent as u32 / 100;

    Submission {
        action,
        answer: Some(answer),
        time_remaining,
        round: Some(round),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::generate_questions;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_perfect_bot_always_answers_correctly() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let question = &generate_questions(1)[0];
        for _ in 0..50 {
            let sub = submission(&mut rng, question, 100, Duration::from_secs(30), 0);
            assert_eq!(sub.answer, Some(question.correct));
            assert!(sub.time_remaining >= Duration::from_secs(3));
            assert!(sub.time_remaining <= Duration::from_secs(24));
        }
    }

    #[test]
    fn test_hopeless_bot_never_does() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let question = &generate_questions(1)[0];
        for _ in 0..50 {
            let sub = submission(&mut rng, question, 0, Duration::from_secs(30), 2);
            assert!(!question.is_correct(sub.answer));
            assert_eq!(sub.round, Some(2));
        }
    }

    #[test]
    fn test_same_seed_same_play() {
        let question = &generate_questions(1)[0];
        let mut first = ChaCha8Rng::seed_from_u64(11);
        let mut second = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..10 {
            assert_eq!(
                submission(&mut first, question, 60, Duration::from_secs(30), 0),
                submission(&mut second, question, 60, Duration::from_secs(30), 0),
            );
        }
    }
}
