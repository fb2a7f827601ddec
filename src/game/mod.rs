//! Battle modules

pub mod bot;
pub mod combat;
pub mod r#match;
pub mod rewards;
pub mod session;

pub use r#match::{BattleService, LaunchedSession, SessionHandle, SessionRegistry};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ws::protocol::{MatchId, MatchPreferences, OpponentInfo, PlayerId};

/// Who is playing a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Human,
    /// Server-driven opponent that answers correctly with the given odds
    Bot { accuracy_percent: u32 },
}

impl PlayerKind {
    pub fn is_bot(&self) -> bool {
        matches!(self, PlayerKind::Bot { .. })
    }
}

/// One seat of a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlayer {
    pub player_id: PlayerId,
    pub rating: i32,
    pub level: u32,
    pub kind: PlayerKind,
}

impl MatchPlayer {
    pub fn info(&self) -> OpponentInfo {
        OpponentInfo {
            player_id: self.player_id,
            rating: self.rating,
            level: self.level,
            is_bot: self.kind.is_bot(),
        }
    }
}

/// A pairing produced by matchmaking. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub match_id: MatchId,
    pub players: [MatchPlayer; 2],
    /// Preferences both entries agreed on (wildcards resolved to the set side)
    pub preferences: MatchPreferences,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(first: MatchPlayer, second: MatchPlayer, preferences: MatchPreferences) -> Self {
        Self {
            match_id: Uuid::new_v4(),
            players: [first, second],
            preferences,
            created_at: Utc::now(),
        }
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&MatchPlayer> {
        self.players.iter().find(|p| &p.player_id == player_id)
    }

    pub fn opponent_of(&self, player_id: &PlayerId) -> Option<&MatchPlayer> {
        match &self.players {
            [a, b] if &a.player_id == player_id => Some(b),
            [a, b] if &b.player_id == player_id => Some(a),
            _ => None,
        }
    }

    pub fn player_ids(&self) -> [PlayerId; 2] {
        [self.players[0].player_id, self.players[1].player_id]
    }
}
