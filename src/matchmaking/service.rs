//! Matchmaking service - manages queue and match creation

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MatchmakingConfig;
use crate::error::MatchmakingError;
use crate::game::{BattleService, LaunchedSession, Match, MatchPlayer, PlayerKind};
use crate::store::{MatchRecorder, ProfileStore};
use crate::ws::protocol::{MatchId, MatchPreferences, PlayerId, QueueEvent, SessionEvent};

use super::compat::agreed_preferences;
use super::queue::{MatchmakingQueue, QueueEntry, QueueNotice, Waiting};

/// Per-player stream of queue notifications. Ends after `Matched`,
/// `TimedOut`, `leave`, or when a rejoin replaces the entry.
#[derive(Debug)]
pub struct QueueSubscription {
    pub player_id: PlayerId,
    events: mpsc::UnboundedReceiver<QueueNotice>,
    session: Option<broadcast::Receiver<SessionEvent>>,
}

impl QueueSubscription {
    pub(crate) fn from_channel(player_id: PlayerId, events: mpsc::UnboundedReceiver<QueueNotice>) -> Self {
        Self {
            player_id,
            events,
            session: None,
        }
    }

    pub async fn recv(&mut self) -> Option<QueueEvent> {
        let notice = self.events.recv().await?;
        if notice.session.is_some() {
            self.session = notice.session;
        }
        Some(notice.event)
    }

    /// Session events for the match announced by `Matched`. The receiver
    /// was opened before the session started, so nothing it published is
    /// missed.
    pub fn take_session_events(&mut self) -> Option<broadcast::Receiver<SessionEvent>> {
        self.session.take()
    }
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    config: MatchmakingConfig,
    profiles: Arc<dyn ProfileStore>,
    recorder: Arc<dyn MatchRecorder>,
    battles: Arc<BattleService>,
}

impl MatchmakingService {
    pub fn new(
        config: MatchmakingConfig,
        profiles: Arc<dyn ProfileStore>,
        recorder: Arc<dyn MatchRecorder>,
        battles: Arc<BattleService>,
    ) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            config,
            profiles,
            recorder,
            battles,
        }
    }

    /// Look up the player's rating and level, then join
    pub async fn join_queue(
        &self,
        player_id: PlayerId,
        preferences: MatchPreferences,
    ) -> Result<QueueSubscription, MatchmakingError> {
        let profile = self
            .profiles
            .rating_and_level(player_id)
            .await
            .map_err(|e| MatchmakingError::Profile(e.to_string()))?;

        let entry = QueueEntry::new(player_id, profile.rating, profile.level, preferences);
        self.join(entry).await
    }

    /// Join matchmaking queue. The first event on the subscription is `Searching`.
    pub async fn join(&self, entry: QueueEntry) -> Result<QueueSubscription, MatchmakingError> {
        let player_id = entry.player_id;

        // Check if already in a match
        if self.battles.current_match(&player_id).is_some() {
            return Err(MatchmakingError::AlreadyInMatch(player_id));
        }

        let (tx, events) = mpsc::unbounded_channel();
        {
            let mut queue = self.queue.lock();
            if queue.is_claimed(&player_id) {
                return Err(MatchmakingError::AlreadyInMatch(player_id));
            }

            let deadline = entry.joined_at + self.config.queue_timeout;
            let rating = entry.rating;
            let waiting = Waiting::new(entry, deadline, tx);
            waiting.notify(QueueEvent::Searching);

            if queue.insert(waiting).is_some() {
                debug!(player_id = %player_id, "Rejoin replaced previous queue entry");
            }
            info!(player_id = %player_id, rating, queue_size = queue.len(), "Player joined matchmaking queue");
        }

        self.try_match().await;
        Ok(QueueSubscription::from_channel(player_id, events))
    }

    /// Leave matchmaking queue. No-op if absent or already being matched.
    pub async fn leave(&self, player_id: PlayerId) {
        let removed = self.queue.lock().remove(&player_id);
        if removed.is_some() {
            info!(player_id = %player_id, "Player left matchmaking queue");
            self.try_match().await;
        }
    }

    /// Pair compatible entries until none remain. Returns the number of
    /// matches created.
    pub async fn try_match(&self) -> usize {
        let mut created = 0;
        loop {
            let pair = self.queue.lock().claim_next_pair(Instant::now(), &self.config);
            let Some((first, second)) = pair else {
                break;
            };
            if !self.create_match(first, second).await {
                // The released pair is retried on the next trigger
                break;
            }
            created += 1;
        }
        created
    }

    /// Persist the match, launch its session and notify both players.
    /// On failure both entries go back to waiting.
    async fn create_match(&self, first: QueueEntry, second: QueueEntry) -> bool {
        let seat = |e: &QueueEntry| MatchPlayer {
            player_id: e.player_id,
            rating: e.rating,
            level: e.level,
            kind: PlayerKind::Human,
        };
        let created = Match::new(
            seat(&first),
            seat(&second),
            agreed_preferences(&first.preferences, &second.preferences),
        );

        if let Err(e) = self.recorder.create_match(&created).await {
            warn!(
                first = %first.player_id,
                second = %second.player_id,
                error = %e,
                "Match creation failed, returning players to the queue"
            );
            let failure = MatchmakingError::MatchCreation(e.to_string());
            let mut queue = self.queue.lock();
            for player_id in [first.player_id, second.player_id] {
                if let Some(waiting) = queue.release(&player_id) {
                    waiting.notify(QueueEvent::Error {
                        message: failure.to_string(),
                    });
                }
            }
            return false;
        }

        let match_id = created.match_id;
        let [first_seat, second_seat] = created.players.clone();
        let LaunchedSession {
            events: [first_events, second_events],
            ..
        } = self.battles.launch(created);

        {
            let mut queue = self.queue.lock();
            for (me, opponent, events) in [
                (&first_seat, &second_seat, first_events),
                (&second_seat, &first_seat, second_events),
            ] {
                if let Some(waiting) = queue.take(&me.player_id) {
                    waiting.notify_matched(
                        QueueEvent::Matched {
                            match_id,
                            opponent: opponent.info(),
                        },
                        events,
                    );
                }
            }
        }

        info!(
            match_id = %match_id,
            first = %first.player_id,
            second = %second.player_id,
            "Created new match"
        );
        true
    }

    /// Notify and drop entries that waited past their deadline
    pub fn sweep(&self) -> usize {
        let expired = self.queue.lock().expire(Instant::now());
        for waiting in &expired {
            info!(player_id = %waiting.entry.player_id, "Queue entry timed out");
            waiting.notify(QueueEvent::TimedOut);
        }
        expired.len()
    }

    /// Pair a player with a bot right away
    pub async fn practice_bot(
        &self,
        player_id: PlayerId,
        preferences: MatchPreferences,
    ) -> Result<LaunchedSession, MatchmakingError> {
        if self.battles.current_match(&player_id).is_some() || self.queue.lock().is_claimed(&player_id) {
            return Err(MatchmakingError::AlreadyInMatch(player_id));
        }
        self.queue.lock().remove(&player_id);

        let profile = self
            .profiles
            .rating_and_level(player_id)
            .await
            .map_err(|e| MatchmakingError::Profile(e.to_string()))?;

        let player = MatchPlayer {
            player_id,
            rating: profile.rating,
            level: profile.level,
            kind: PlayerKind::Human,
        };
        self.battles
            .launch_bot_match(player, preferences)
            .await
            .map_err(|e| MatchmakingError::MatchCreation(e.to_string()))
    }

    /// Run the matchmaking service (periodic sweep and matching)
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.sweep();
            // Windows widen with time, so pairs can appear without a join
            self.try_match().await;
        }
    }

    /// Get current queue size
    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if player is in queue
    pub fn is_in_queue(&self, player_id: &PlayerId) -> bool {
        self.queue.lock().contains(player_id)
    }

    /// Get player's current match ID
    pub fn current_match(&self, player_id: &PlayerId) -> Option<MatchId> {
        self.battles.current_match(player_id)
    }
}
