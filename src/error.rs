//! Error taxonomy surfaced by the matchmaking and battle layers.
//!
//! Collaborator failures (`StoreError`) are mapped into these kinds before
//! they leave the stateful layers.

use crate::game::session::SessionPhase;
use crate::ws::protocol::{MatchId, PlayerId};

/// Errors returned by the matchmaking coordinator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchmakingError {
    /// The entry waited past its deadline. The client may rejoin.
    #[error("no opponent found before the queue deadline")]
    QueueTimeout,

    #[error("player {0} is already in a match")]
    AlreadyInMatch(PlayerId),

    #[error("match creation failed: {0}")]
    MatchCreation(String),

    #[error("profile lookup failed: {0}")]
    Profile(String),
}

impl MatchmakingError {
    /// Stable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            MatchmakingError::QueueTimeout => "queue_timeout",
            MatchmakingError::AlreadyInMatch(_) => "already_in_match",
            MatchmakingError::MatchCreation(_) => "match_creation_failed",
            MatchmakingError::Profile(_) => "profile_unavailable",
        }
    }
}

/// Errors returned by battle sessions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("question bank returned {received} of {requested} questions")]
    QuestionSupplyShortfall { requested: usize, received: usize },

    /// Outcome is kept in memory; retrying does not replay rounds
    #[error("failed to persist match outcome: {0}")]
    PersistenceFailure(String),

    #[error("match {0} not found")]
    NotFound(MatchId),

    #[error("match {0} is unavailable")]
    Unavailable(MatchId),

    #[error("player {0} is not part of this match")]
    NotParticipant(PlayerId),

    #[error("operation not allowed in phase {0}")]
    InvalidPhase(SessionPhase),
}

impl SessionError {
    /// Stable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::QuestionSupplyShortfall { .. } => "question_supply_shortfall",
            SessionError::PersistenceFailure(_) => "persistence_failure",
            SessionError::NotFound(_) => "match_not_found",
            SessionError::Unavailable(_) => "match_unavailable",
            SessionError::NotParticipant(_) => "not_participant",
            SessionError::InvalidPhase(_) => "invalid_phase",
        }
    }

    /// Whether a caller can retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::PersistenceFailure(_))
    }
}
