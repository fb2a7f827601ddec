//! Pairing rules for two waiting entries

use tokio::time::{Duration, Instant};

use crate::config::MatchmakingConfig;
use crate::ws::protocol::MatchPreferences;

use super::queue::QueueEntry;

/// Allowed rating gap after waiting `waited`. Starts at the base window and
/// grows by one step per full interval.
pub fn rating_window(waited: Duration, config: &MatchmakingConfig) -> u32 {
    let interval = config.window_interval.as_millis().max(1);
    let steps = (waited.as_millis() / interval).min(u32::MAX as u128) as u32;
    config
        .base_rating_window
        .saturating_add(config.rating_window_growth.saturating_mul(steps))
}

fn conflicts<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x != y)
}

/// Both sides set a value and the values differ. Unset is a wildcard.
pub fn preferences_conflict(a: &MatchPreferences, b: &MatchPreferences) -> bool {
    conflicts(&a.mode, &b.mode) || conflicts(&a.category, &b.category) || conflicts(&a.difficulty, &b.difficulty)
}

/// Preferences for the match: whichever side set a value wins
pub fn agreed_preferences(a: &MatchPreferences, b: &MatchPreferences) -> MatchPreferences {
    MatchPreferences {
        mode: a.mode.clone().or_else(|| b.mode.clone()),
        category: a.category.clone().or_else(|| b.category.clone()),
        difficulty: a.difficulty.or(b.difficulty),
    }
}

pub fn is_compatible(a: &QueueEntry, b: &QueueEntry, now: Instant, config: &MatchmakingConfig) -> bool {
    if a.player_id == b.player_id || a.claimed || b.claimed {
        return false;
    }
    if preferences_conflict(&a.preferences, &b.preferences) {
        return false;
    }

    let waited = now.saturating_duration_since(a.joined_at.min(b.joined_at));
    a.rating.abs_diff(b.rating) <= rating_window(waited, config)
}
