//! Battle session state machine
//!
//! Owns one match from question assignment to the final outcome:
//!
//! ```text
//! Preparing → RoundActive ⇄ Resolving → Completed
//!      └───────────┴───────────┴──────→ Error
//! ```
//!
//! Everything here is synchronous and deterministic for a given seed; the
//! actor in `match.rs` feeds it commands and deadlines one at a time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

use crate::config::{BattleRules, RewardRules};
use crate::error::SessionError;
use crate::store::questions::{difficulty_multiplier, Question};
use crate::ws::protocol::{
    Action, AnswerOption, MatchId, MatchOutcome, PlayerId, PlayerTotals, RoundResult, RoundReveal,
    SessionEvent,
};

use super::combat::{self, Contender, RoundState};
use super::rewards;
use super::Match;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Preparing,
    RoundActive,
    Resolving,
    Completed,
    Error,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preparing => write!(f, "Preparing"),
            Self::RoundActive => write!(f, "RoundActive"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Completed => write!(f, "Completed"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// A player's answer for the current round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub action: Action,
    pub answer: Option<AnswerOption>,
    /// Client-reported time left on the round clock
    pub time_remaining: Duration,
    /// Round the client answered; `None` means the current one
    pub round: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Already submitted this round; the first submission stands
    Duplicate,
    /// Answer for a round that is no longer open
    Stale,
}

/// Everything produced by resolving one round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResolution {
    pub result: RoundResult,
    pub reveals: Vec<RoundReveal>,
    pub correct_answer: AnswerOption,
    pub totals: Vec<PlayerTotals>,
}

impl RoundResolution {
    pub fn event(&self) -> SessionEvent {
        SessionEvent::RoundResolved {
            result: self.result.clone(),
            reveals: self.reveals.clone(),
            correct_answer: self.correct_answer,
            totals: self.totals.clone(),
        }
    }
}

/// Read-only view for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub match_id: MatchId,
    pub phase: SessionPhase,
    pub round: u32,
    pub total_rounds: u32,
    pub totals: Vec<PlayerTotals>,
    pub outcome: Option<MatchOutcome>,
}

pub struct BattleSession {
    created: Match,
    rules: BattleRules,
    reward_rules: RewardRules,
    questions: Vec<Question>,
    phase: SessionPhase,
    round_index: usize,
    /// Submissions for the open round, keyed by player
    rounds: HashMap<PlayerId, RoundState>,
    /// Rounds resolved so far; guards against double resolution
    resolved_rounds: usize,
    /// Same order as `created.players`
    totals: [PlayerTotals; 2],
    confirmed: HashSet<PlayerId>,
    absent: HashSet<PlayerId>,
    rng: ChaCha8Rng,
    forfeited_by: Option<PlayerId>,
    outcome: Option<MatchOutcome>,
}

impl BattleSession {
    pub fn new(created: Match, rules: BattleRules, reward_rules: RewardRules, seed: u64) -> Self {
        let fresh = |player_id| PlayerTotals {
            player_id,
            health: rules.starting_health,
            shield: rules.starting_shield,
            score: 0,
            current_streak: 0,
            best_streak: 0,
            damage_dealt: 0,
            last_time_remaining_ms: 0,
        };
        let [a, b] = created.player_ids();
        let totals = [fresh(a), fresh(b)];

        // Bots never need a live connection
        let confirmed = created
            .players
            .iter()
            .filter(|p| p.kind.is_bot())
            .map(|p| p.player_id)
            .collect();

        Self {
            created,
            rules,
            reward_rules,
            questions: Vec::new(),
            phase: SessionPhase::Preparing,
            round_index: 0,
            rounds: HashMap::new(),
            resolved_rounds: 0,
            totals,
            confirmed,
            absent: HashSet::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            forfeited_by: None,
            outcome: None,
        }
    }

    pub fn match_info(&self) -> &Match {
        &self.created
    }

    pub fn rules(&self) -> &BattleRules {
        &self.rules
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn round_index(&self) -> usize {
        self.round_index
    }

    pub fn total_rounds(&self) -> usize {
        self.rules.rounds
    }

    pub fn totals(&self) -> &[PlayerTotals] {
        &self.totals
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            SessionPhase::RoundActive | SessionPhase::Resolving => self.questions.get(self.round_index),
            _ => None,
        }
    }

    pub fn has_submitted(&self, player_id: &PlayerId) -> bool {
        self.rounds.contains_key(player_id)
    }

    fn check_participant(&self, player_id: &PlayerId) -> Result<(), SessionError> {
        if self.created.player(player_id).is_some() {
            Ok(())
        } else {
            Err(SessionError::NotParticipant(*player_id))
        }
    }

    /// Install the question set. Fewer questions than rounds is fatal.
    pub fn assign_questions(&mut self, mut questions: Vec<Question>) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Preparing {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        if questions.len() < self.rules.rounds {
            let err = SessionError::QuestionSupplyShortfall {
                requested: self.rules.rounds,
                received: questions.len(),
            };
            self.fail();
            return Err(err);
        }
        questions.truncate(self.rules.rounds);
        self.questions = questions;
        Ok(())
    }

    /// Record a live client connection. Returns true once every seat is confirmed.
    pub fn confirm(&mut self, player_id: PlayerId) -> Result<bool, SessionError> {
        self.check_participant(&player_id)?;
        self.confirmed.insert(player_id);
        self.absent.remove(&player_id);
        Ok(self.all_confirmed())
    }

    pub fn all_confirmed(&self) -> bool {
        self.created
            .players
            .iter()
            .all(|p| self.confirmed.contains(&p.player_id))
    }

    /// Open round 0
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Preparing || self.questions.is_empty() {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        self.phase = SessionPhase::RoundActive;
        Ok(())
    }

    /// Event announcing the open round
    pub fn round_started_event(&self) -> Option<SessionEvent> {
        if self.phase != SessionPhase::RoundActive {
            return None;
        }
        let question = self.questions.get(self.round_index)?;
        Some(SessionEvent::RoundStarted {
            round: self.round_index as u32,
            total_rounds: self.rules.rounds as u32,
            question: question.view(),
            time_limit_ms: self.rules.question_time_limit.as_millis() as u64,
        })
    }

    /// Accept one submission per player per round.
    ///
    /// `server_remaining` is the time left on the server's round clock; the
    /// client's claim is clamped to it.
    pub fn submit(
        &mut self,
        player_id: PlayerId,
        submission: Submission,
        server_remaining: Duration,
    ) -> Result<SubmitOutcome, SessionError> {
        self.check_participant(&player_id)?;

        if self.phase != SessionPhase::RoundActive {
            return if self.phase.is_terminal() || self.phase == SessionPhase::Resolving {
                Ok(SubmitOutcome::Stale)
            } else {
                Err(SessionError::InvalidPhase(self.phase))
            };
        }
        if submission.round.is_some_and(|r| r as usize != self.round_index) {
            return Ok(SubmitOutcome::Stale);
        }
        if self.rounds.contains_key(&player_id) {
            return Ok(SubmitOutcome::Duplicate);
        }
        let Some(question) = self.questions.get(self.round_index) else {
            return Err(SessionError::InvalidPhase(self.phase));
        };

        let time_remaining = submission
            .time_remaining
            .min(server_remaining)
            .min(self.rules.question_time_limit);
        let state = RoundState::submitted(
            submission.action,
            submission.answer,
            question.is_correct(submission.answer),
            time_remaining,
        );
        self.rounds.insert(player_id, state);
        self.absent.remove(&player_id);
        Ok(SubmitOutcome::Accepted)
    }

    /// Players who will not answer this round
    pub fn mark_absent(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        self.check_participant(&player_id)?;
        self.absent.insert(player_id);
        Ok(())
    }

    pub fn is_absent(&self, player_id: &PlayerId) -> bool {
        self.absent.contains(player_id)
    }

    /// True when every present player has submitted. If nobody is present
    /// the round waits for its deadline.
    pub fn ready_to_resolve(&self) -> bool {
        if self.phase != SessionPhase::RoundActive {
            return false;
        }
        let mut present = self
            .created
            .players
            .iter()
            .filter(|p| !self.absent.contains(&p.player_id))
            .peekable();
        present.peek().is_some() && present.all(|p| self.rounds.contains_key(&p.player_id))
    }

    /// Resolve the open round. Returns `None` if it was already resolved or
    /// no round is open, so duplicate deadline/submit triggers are harmless.
    pub fn resolve_round(&mut self) -> Option<RoundResolution> {
        if self.phase != SessionPhase::RoundActive || self.resolved_rounds > self.round_index {
            return None;
        }
        let question = self.questions.get(self.round_index)?.clone();
        self.phase = SessionPhase::Resolving;

        let [a, b] = self.created.player_ids();
        let state_a = self.take_or_timeout(a);
        let state_b = self.take_or_timeout(b);

        let result = combat::resolve(
            self.round_index as u32,
            Contender {
                player_id: a,
                round: &state_a,
                shield: self.totals[0].shield,
            },
            Contender {
                player_id: b,
                round: &state_b,
                shield: self.totals[1].shield,
            },
            &self.rules,
        );

        for (totals, state) in self.totals.iter_mut().zip([&state_a, &state_b]) {
            combat::apply_result(totals, &result);
            if state.is_correct {
                totals.score += 1;
                totals.current_streak += 1;
                totals.best_streak = totals.best_streak.max(totals.current_streak);
            } else {
                totals.current_streak = 0;
            }
            totals.last_time_remaining_ms = state.time_remaining.as_millis() as u64;
        }

        let reveals = [(a, &state_a), (b, &state_b)]
            .into_iter()
            .map(|(player_id, state)| RoundReveal {
                player_id,
                action: state.selected_action,
                answer: state.submitted_answer,
                correct: state.is_correct,
                timed_out: !state.ready,
                time_remaining_ms: state.time_remaining.as_millis() as u64,
            })
            .collect();

        self.resolved_rounds = self.round_index + 1;
        debug!(
            match_id = %self.created.match_id,
            round = self.round_index,
            kind = ?result.kind,
            damage = result.damage,
            "Round resolved"
        );

        let someone_down = self.totals.iter().any(|t| t.health == 0);
        if someone_down || self.round_index + 1 >= self.questions.len() {
            self.complete(None);
        } else {
            self.round_index += 1;
            self.phase = SessionPhase::RoundActive;
        }

        Some(RoundResolution {
            result,
            reveals,
            correct_answer: question.correct,
            totals: self.totals.to_vec(),
        })
    }

    /// Submitted state, or the timeout fill-in with a random action
    fn take_or_timeout(&mut self, player_id: PlayerId) -> RoundState {
        match self.rounds.remove(&player_id) {
            Some(state) => state,
            None => {
                let action = Action::ALL[self.rng.gen_range(0..Action::ALL.len())];
                RoundState::timed_out(action)
            }
        }
    }

    /// End the match immediately with `player_id` losing
    pub fn forfeit(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        self.check_participant(&player_id)?;
        if self.phase.is_terminal() {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        self.rounds.clear();
        self.complete(Some(player_id));
        Ok(())
    }

    /// Unrecoverable fault; no further transitions
    pub fn fail(&mut self) {
        if self.phase != SessionPhase::Completed {
            self.phase = SessionPhase::Error;
        }
    }

    fn complete(&mut self, forfeited_by: Option<PlayerId>) {
        self.forfeited_by = forfeited_by;
        let winner_id = match forfeited_by {
            Some(loser) => self.created.opponent_of(&loser).map(|p| p.player_id),
            None => self.decide_winner(),
        };

        let rewards = rewards::settle(
            &self.created,
            &self.totals,
            winner_id,
            self.questions.len() as u32,
            difficulty_multiplier(&self.questions),
            &self.reward_rules,
        );

        self.outcome = Some(MatchOutcome {
            match_id: self.created.match_id,
            winner_id,
            forfeited_by,
            final_scores: self.totals.to_vec(),
            rewards,
            rounds_played: self.resolved_rounds as u32,
            completed_at: Utc::now(),
        });
        self.phase = SessionPhase::Completed;
    }

    /// Health decides first, then correct answers; otherwise a draw
    fn decide_winner(&self) -> Option<PlayerId> {
        let [a, b] = &self.totals;
        let key = |t: &PlayerTotals| (t.health, t.score);
        match key(a).cmp(&key(b)) {
            std::cmp::Ordering::Greater => Some(a.player_id),
            std::cmp::Ordering::Less => Some(b.player_id),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            match_id: self.created.match_id,
            phase: self.phase,
            round: self.round_index as u32,
            total_rounds: self.rules.rounds as u32,
            totals: self.totals.to_vec(),
            outcome: self.outcome.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchPlayer, PlayerKind};
    use crate::store::memory::generate_questions;
    use crate::ws::protocol::{MatchPreferences, RoundKind};
    use uuid::Uuid;

    fn seat(kind: PlayerKind) -> MatchPlayer {
        MatchPlayer {
            player_id: Uuid::new_v4(),
            rating: 1000,
            level: 3,
            kind,
        }
    }

    fn session_with(rules: BattleRules) -> (BattleSession, PlayerId, PlayerId) {
        let created = Match::new(
            seat(PlayerKind::Human),
            seat(PlayerKind::Human),
            MatchPreferences::default(),
        );
        let [a, b] = created.player_ids();
        let mut session = BattleSession::new(created, rules, RewardRules::default(), 7);
        session
            .assign_questions(generate_questions(session.total_rounds()))
            .unwrap();
        (session, a, b)
    }

    fn started(rules: BattleRules) -> (BattleSession, PlayerId, PlayerId) {
        let (mut session, a, b) = session_with(rules);
        session.confirm(a).unwrap();
        assert!(session.confirm(b).unwrap());
        session.begin().unwrap();
        (session, a, b)
    }

    fn answer(session: &BattleSession, correct: bool, action: Action, secs: u64) -> Submission {
        let question = session.current_question().unwrap();
        let answer = if correct {
            question.correct
        } else {
            *AnswerOption::ALL
                .iter()
                .find(|o| **o != question.correct)
                .unwrap()
        };
        Submission {
            action,
            answer: Some(answer),
            time_remaining: Duration::from_secs(secs),
            round: None,
        }
    }

    const FULL: Duration = Duration::from_secs(30);

    #[test]
    fn test_short_question_supply_is_fatal() {
        let created = Match::new(
            seat(PlayerKind::Human),
            seat(PlayerKind::Human),
            MatchPreferences::default(),
        );
        let mut session = BattleSession::new(created, BattleRules::default(), RewardRules::default(), 1);
        let err = session.assign_questions(generate_questions(3)).unwrap_err();
        assert_eq!(
            err,
            SessionError::QuestionSupplyShortfall {
                requested: 5,
                received: 3
            }
        );
        assert_eq!(session.phase(), SessionPhase::Error);
        assert!(session.outcome().is_none());
    }

    #[test]
    fn test_bot_seat_is_pre_confirmed() {
        let human = seat(PlayerKind::Human);
        let human_id = human.player_id;
        let created = Match::new(
            human,
            seat(PlayerKind::Bot { accuracy_percent: 50 }),
            MatchPreferences::default(),
        );
        let mut session = BattleSession::new(created, BattleRules::default(), RewardRules::default(), 1);
        assert!(!session.all_confirmed());
        assert!(session.confirm(human_id).unwrap());
    }

    #[test]
    fn test_outsider_cannot_submit() {
        let (mut session, _, _) = started(BattleRules::default());
        let outsider = Uuid::new_v4();
        let sub = answer(&session, true, Action::Strike, 10);
        assert_eq!(
            session.submit(outsider, sub, FULL),
            Err(SessionError::NotParticipant(outsider))
        );
    }

    #[test]
    fn test_duplicate_submission_keeps_the_first() {
        let (mut session, a, b) = started(BattleRules::default());
        let first = answer(&session, true, Action::Strike, 20);
        let retry = answer(&session, false, Action::Guard, 29);

        assert_eq!(session.submit(a, first, FULL), Ok(SubmitOutcome::Accepted));
        assert_eq!(session.submit(a, retry, FULL), Ok(SubmitOutcome::Duplicate));

        let sub_b = answer(&session, false, Action::Feint, 5);
        session.submit(b, sub_b, FULL).unwrap();
        let resolution = session.resolve_round().unwrap();

        let reveal = resolution.reveals.iter().find(|r| r.player_id == a).unwrap();
        assert_eq!(reveal.action, Action::Strike);
        assert!(reveal.correct);
    }

    #[test]
    fn test_stale_round_submission_is_ignored() {
        let (mut session, a, b) = started(BattleRules::default());
        let sub = answer(&session, true, Action::Strike, 20);
        session.submit(a, sub.clone(), FULL).unwrap();
        session.submit(b, sub.clone(), FULL).unwrap();
        session.resolve_round().unwrap();

        let late_retry = Submission {
            round: Some(0),
            ..sub
        };
        assert_eq!(session.submit(a, late_retry, FULL), Ok(SubmitOutcome::Stale));
        assert!(!session.has_submitted(&a));
    }

    #[test]
    fn test_client_time_is_clamped_to_server_clock() {
        let (mut session, a, b) = started(BattleRules::default());
        let greedy = answer(&session, true, Action::Strike, 30);
        session.submit(a, greedy, Duration::from_secs(12)).unwrap();
        let other = answer(&session, false, Action::Feint, 0);
        session.submit(b, other, FULL).unwrap();

        let resolution = session.resolve_round().unwrap();
        assert_eq!(resolution.result.damage, 8);
    }

    #[test]
    fn test_resolution_is_applied_once() {
        let (mut session, a, b) = started(BattleRules::default());
        let sa = answer(&session, true, Action::Strike, 18);
        let sb = answer(&session, true, Action::Feint, 10);
        session.submit(a, sa, FULL).unwrap();
        session.submit(b, sb, FULL).unwrap();

        assert!(session.resolve_round().is_some());
        let after_first = session.totals().to_vec();
        // A second trigger (deadline racing the last submit) finds nothing to do
        assert!(session.resolve_round().is_none());
        assert_eq!(session.totals(), after_first.as_slice());
        assert_eq!(after_first[1].health, 88);
        assert_eq!(session.round_index(), 1);
    }

    #[test]
    fn test_missing_player_takes_the_timeout_path() {
        let (mut session, a, b) = started(BattleRules::default());
        let sa = answer(&session, true, Action::Guard, 15);
        session.submit(a, sa, FULL).unwrap();
        assert!(!session.ready_to_resolve());

        let resolution = session.resolve_round().unwrap();
        let reveal_b = resolution.reveals.iter().find(|r| r.player_id == b).unwrap();
        assert!(reveal_b.timed_out);
        assert!(!reveal_b.correct);
        assert_eq!(reveal_b.answer, None);
        assert_eq!(reveal_b.time_remaining_ms, 0);
        assert_ne!(resolution.result.kind, RoundKind::BothWrong);
    }

    #[test]
    fn test_absent_player_does_not_block_resolution() {
        let (mut session, a, b) = started(BattleRules::default());
        session.mark_absent(b).unwrap();
        assert!(session.is_absent(&b));
        assert!(!session.ready_to_resolve());
        let sa = answer(&session, true, Action::Strike, 20);
        session.submit(a, sa, FULL).unwrap();
        assert!(session.ready_to_resolve());
    }

    #[test]
    fn test_all_rounds_played_completes_with_outcome() {
        let (mut session, a, b) = started(BattleRules::default());
        for _ in 0..5 {
            assert!(session.outcome().is_none());
            let sa = answer(&session, true, Action::Feint, 10);
            let sb = answer(&session, true, Action::Feint, 10);
            session.submit(a, sa, FULL).unwrap();
            session.submit(b, sb, FULL).unwrap();
            session.resolve_round().unwrap();
        }
        assert_eq!(session.phase(), SessionPhase::Completed);
        let outcome = session.outcome().unwrap();
        // Every round was a mirror with tied time: nobody took damage
        assert_eq!(outcome.winner_id, None);
        assert_eq!(outcome.rounds_played, 5);
        assert!(outcome.final_scores.iter().all(|t| t.score == 5 && t.best_streak == 5));
    }

    #[test]
    fn test_knockout_ends_early() {
        let rules = BattleRules {
            starting_health: 10,
            ..BattleRules::default()
        };
        let (mut session, a, b) = started(rules);
        let sa = answer(&session, true, Action::Strike, 30);
        let sb = answer(&session, false, Action::Feint, 30);
        session.submit(a, sa, FULL).unwrap();
        session.submit(b, sb, FULL).unwrap();
        session.resolve_round().unwrap();

        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(session.outcome().unwrap().winner_id, Some(a));
        assert_eq!(session.outcome().unwrap().rounds_played, 1);
        assert!(session.resolve_round().is_none());
    }

    #[test]
    fn test_knockout_rewards_count_every_assigned_question() {
        let rules = BattleRules {
            starting_health: 10,
            ..BattleRules::default()
        };
        let (mut session, a, b) = started(rules);
        let sa = answer(&session, true, Action::Strike, 30);
        let sb = answer(&session, false, Action::Feint, 30);
        session.submit(a, sa, FULL).unwrap();
        session.submit(b, sb, FULL).unwrap();
        session.resolve_round().unwrap();

        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.rounds_played, 1);
        let totals = outcome.final_scores.iter().find(|t| t.player_id == b).unwrap();
        let expected = rewards::compute_rewards(
            &rewards::RewardInput {
                final_score: 0,
                total_questions: 5,
                difficulty_multiplier: difficulty_multiplier(&session.questions),
                streak: totals.best_streak,
                time_left_at_end: Duration::from_millis(totals.last_time_remaining_ms),
            },
            &RewardRules::default(),
        );
        let loser = outcome.rewards.iter().find(|r| r.player_id == b).unwrap();
        assert_eq!(loser.rewards, expected);
        assert!(loser.rewards.xp > 0);
    }

    #[test]
    fn test_forfeit_names_the_opponent_winner() {
        let (mut session, a, b) = started(BattleRules::default());
        session.forfeit(b).unwrap();
        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.winner_id, Some(a));
        assert_eq!(outcome.forfeited_by, Some(b));
        assert_eq!(session.forfeit(a), Err(SessionError::InvalidPhase(SessionPhase::Completed)));
    }

    #[test]
    fn test_submit_before_start_is_rejected() {
        let (mut session, a, _) = session_with(BattleRules::default());
        let sub = Submission {
            action: Action::Strike,
            answer: None,
            time_remaining: FULL,
            round: None,
        };
        assert_eq!(
            session.submit(a, sub, FULL),
            Err(SessionError::InvalidPhase(SessionPhase::Preparing))
        );
    }
}
