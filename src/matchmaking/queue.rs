//! Matchmaking queue implementation

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, Instant};

use crate::config::MatchmakingConfig;
use crate::ws::protocol::{MatchPreferences, PlayerId, QueueEvent, SessionEvent};

use super::compat::is_compatible;

/// Player in the matchmaking queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub rating: i32,
    pub level: u32,
    pub joined_at: Instant,
    pub preferences: MatchPreferences,
    /// Held by an in-flight match creation
    pub claimed: bool,
}

impl QueueEntry {
    pub fn new(player_id: PlayerId, rating: i32, level: u32, preferences: MatchPreferences) -> Self {
        Self {
            player_id,
            rating,
            level,
            joined_at: Instant::now(),
            preferences,
            claimed: false,
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.joined_at)
    }
}

/// One delivery on a queue subscription. `Matched` carries the seat's
/// session receiver, opened before the session task started.
#[derive(Debug)]
pub struct QueueNotice {
    pub event: QueueEvent,
    pub session: Option<broadcast::Receiver<SessionEvent>>,
}

/// A queued entry with its notification channel
#[derive(Debug)]
pub struct Waiting {
    pub entry: QueueEntry,
    pub deadline: Instant,
    notify: mpsc::UnboundedSender<QueueNotice>,
}

impl Waiting {
    pub fn new(entry: QueueEntry, deadline: Instant, notify: mpsc::UnboundedSender<QueueNotice>) -> Self {
        Self {
            entry,
            deadline,
            notify,
        }
    }

    /// Deliver an event; a dropped subscriber is not an error
    pub fn notify(&self, event: QueueEvent) {
        let _ = self.notify.send(QueueNotice { event, session: None });
    }

    pub fn notify_matched(&self, event: QueueEvent, session: broadcast::Receiver<SessionEvent>) {
        let _ = self.notify.send(QueueNotice {
            event,
            session: Some(session),
        });
    }
}

/// Waiting entries, kept ordered by `joined_at` (oldest first)
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    waiting: Vec<Waiting>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any unclaimed entry for the same player.
    /// Returns the replaced entry.
    pub fn insert(&mut self, waiting: Waiting) -> Option<Waiting> {
        let replaced = self.remove(&waiting.entry.player_id);
        let joined_at = waiting.entry.joined_at;
        let pos = self.waiting.partition_point(|w| w.entry.joined_at <= joined_at);
        self.waiting.insert(pos, waiting);
        replaced
    }

    /// Remove an unclaimed entry. Claimed entries belong to a match creation.
    pub fn remove(&mut self, player_id: &PlayerId) -> Option<Waiting> {
        let pos = self
            .waiting
            .iter()
            .position(|w| &w.entry.player_id == player_id && !w.entry.claimed)?;
        Some(self.waiting.remove(pos))
    }

    /// Remove an entry whether or not it is claimed
    pub fn take(&mut self, player_id: &PlayerId) -> Option<Waiting> {
        let pos = self.waiting.iter().position(|w| &w.entry.player_id == player_id)?;
        Some(self.waiting.remove(pos))
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Waiting> {
        self.waiting.iter().find(|w| &w.entry.player_id == player_id)
    }

    /// Check if a player is in the queue
    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.get(player_id).is_some()
    }

    pub fn is_claimed(&self, player_id: &PlayerId) -> bool {
        self.get(player_id).is_some_and(|w| w.entry.claimed)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Oldest-first scan for the first compatible pair. Both entries are
    /// marked claimed and returned; they stay queued until the caller takes
    /// or releases them.
    pub fn claim_next_pair(&mut self, now: Instant, config: &MatchmakingConfig) -> Option<(QueueEntry, QueueEntry)> {
        let (i, j) = self.find_pair(now, config)?;
        self.waiting[i].entry.claimed = true;
        self.waiting[j].entry.claimed = true;
        Some((self.waiting[i].entry.clone(), self.waiting[j].entry.clone()))
    }

    fn find_pair(&self, now: Instant, config: &MatchmakingConfig) -> Option<(usize, usize)> {
        for (i, older) in self.waiting.iter().enumerate() {
            if older.entry.claimed {
                continue;
            }
            for (j, newer) in self.waiting.iter().enumerate().skip(i + 1) {
                if is_compatible(&older.entry, &newer.entry, now, config) {
                    return Some((i, j));
                }
            }
        }
        None
    }

    /// Undo a claim after a failed match creation. `joined_at` is untouched,
    /// so the entry keeps its place in line.
    pub fn release(&mut self, player_id: &PlayerId) -> Option<&Waiting> {
        let waiting = self.waiting.iter_mut().find(|w| &w.entry.player_id == player_id)?;
        waiting.entry.claimed = false;
        Some(waiting)
    }

    /// Remove every unclaimed entry whose deadline has passed
    pub fn expire(&mut self, now: Instant) -> Vec<Waiting> {
        let (expired, kept): (Vec<Waiting>, Vec<Waiting>) = std::mem::take(&mut self.waiting)
            .into_iter()
            .partition(|w| !w.entry.claimed && w.deadline <= now);
        self.waiting = kept;
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.waiting.iter().map(|w| &w.entry)
    }
}
