//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type MatchId = Uuid;

/// The three round actions. Each beats exactly one other:
/// strike beats feint, feint beats guard, guard beats strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Strike,
    Guard,
    Feint,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Strike, Action::Guard, Action::Feint];

    /// The action this one has the advantage over
    pub fn beats(self) -> Action {
        match self {
            Action::Strike => Action::Feint,
            Action::Feint => Action::Guard,
            Action::Guard => Action::Strike,
        }
    }

    pub fn has_advantage_over(self, other: Action) -> bool {
        self.beats() == other
    }
}

/// Answer option identifiers (every question has four)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    pub const ALL: [AnswerOption; 4] = [
        AnswerOption::A,
        AnswerOption::B,
        AnswerOption::C,
        AnswerOption::D,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Reward multiplier for questions of this difficulty
    pub fn multiplier(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 1.25,
            Difficulty::Hard => 1.5,
        }
    }
}

/// Optional queue filters. `None` is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPreferences {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the matchmaking queue
    JoinQueue {
        #[serde(default)]
        preferences: MatchPreferences,
    },

    /// Leave the matchmaking queue
    LeaveQueue,

    /// Start a match against a bot
    PracticeBot {
        #[serde(default)]
        preferences: MatchPreferences,
    },

    /// Confirm the client is connected to its match
    Ready { match_id: MatchId },

    /// Answer for the current round
    SubmitRound {
        match_id: MatchId,
        /// Round the answer is for; a mismatch marks a stale retry
        #[serde(default)]
        round: Option<u32>,
        action: Action,
        answer: Option<AnswerOption>,
        /// Client-side countdown at the moment of submission
        time_remaining_ms: u64,
    },

    /// Ask a completed match to persist its outcome again
    RetryPersistence { match_id: MatchId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: PlayerId, server_time: u64 },

    /// Matchmaking notification
    Queue { event: QueueEvent },

    /// Battle notification for a match the player is in
    Session { match_id: MatchId, event: SessionEvent },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Opponent summary sent on match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentInfo {
    pub player_id: PlayerId,
    pub rating: i32,
    pub level: u32,
    pub is_bot: bool,
}

/// Per-player matchmaking notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Searching,
    Matched {
        match_id: MatchId,
        opponent: OpponentInfo,
    },
    /// No opponent found before the queue deadline; the client may rejoin
    TimedOut,
    /// Match creation failed; the entry is still queued
    Error { message: String },
}

/// A question as shown to clients, without the correct option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub prompt: String,
    pub options: [String; 4],
    pub difficulty: Difficulty,
    pub category: String,
}

/// Which rule decided a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    BothWrong,
    Advantage,
    CounterHit,
    DefenseSuccess,
    MirrorTimeLead,
    MirrorSoloCorrect,
    NoAttack,
}

/// Outcome of one resolved round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: u32,
    pub kind: RoundKind,
    pub attacker_id: Option<PlayerId>,
    /// Player hit by the attack, or the player whose shield grew
    pub defender_id: Option<PlayerId>,
    /// Damage before shield absorption
    pub damage: u32,
    pub shield_absorbed: u32,
    pub shield_broken: bool,
    pub defender_shield_gained: u32,
    /// Health lost by each player when both answered wrong
    pub mutual_penalty: u32,
}

/// What a player submitted, revealed after resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReveal {
    pub player_id: PlayerId,
    pub action: Action,
    pub answer: Option<AnswerOption>,
    pub correct: bool,
    pub timed_out: bool,
    pub time_remaining_ms: u64,
}

/// Running totals carried between rounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTotals {
    pub player_id: PlayerId,
    pub health: u32,
    pub shield: u32,
    /// Correct answers so far
    pub score: u32,
    pub current_streak: u32,
    pub best_streak: u32,
    pub damage_dealt: u32,
    pub last_time_remaining_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rewards {
    pub xp: u32,
    pub coins: u32,
    pub streak_bonus: u32,
    pub time_bonus: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerReward {
    pub player_id: PlayerId,
    pub rewards: Rewards,
    pub rating_before: i32,
    pub rating_delta: i32,
}

/// Final result of a completed match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub winner_id: Option<PlayerId>,
    /// Set when the match ended by forfeit
    pub forfeited_by: Option<PlayerId>,
    pub final_scores: Vec<PlayerTotals>,
    pub rewards: Vec<PlayerReward>,
    pub rounds_played: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchErrorKind {
    QuestionSupplyShortfall,
    PersistenceFailure,
    Internal,
}

/// Per-session battle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    RoundStarted {
        round: u32,
        total_rounds: u32,
        question: QuestionView,
        time_limit_ms: u64,
    },
    /// A player locked in an answer (contents stay hidden until resolution)
    PlayerSubmitted { round: u32, player_id: PlayerId },
    RoundResolved {
        result: RoundResult,
        reveals: Vec<RoundReveal>,
        correct_answer: AnswerOption,
        totals: Vec<PlayerTotals>,
    },
    MatchCompleted { outcome: MatchOutcome },
    MatchError {
        kind: MatchErrorKind,
        reason: String,
        retryable: bool,
    },
}
