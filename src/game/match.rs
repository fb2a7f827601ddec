//! Session actor, handles and registry
//!
//! Every match runs in its own task. All commands for a match go through one
//! mpsc channel and are applied by that task in arrival order, so a session
//! never needs a lock and a round can only be resolved once.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{BattleRules, RewardRules};
use crate::error::SessionError;
use crate::store::{MatchRecorder, QuestionBank, QuestionFilter, StoreError};
use crate::ws::protocol::{
    MatchErrorKind, MatchId, MatchOutcome, MatchPreferences, OpponentInfo, PlayerId, SessionEvent,
};

use super::bot;
use super::session::{BattleSession, SessionPhase, SessionSnapshot, Submission, SubmitOutcome};
use super::{Match, MatchPlayer, PlayerKind};

/// Commands applied by the session task
#[derive(Debug)]
pub enum SessionCommand {
    Confirm {
        player_id: PlayerId,
    },
    Submit {
        player_id: PlayerId,
        submission: Submission,
    },
    Disconnect {
        player_id: PlayerId,
    },
    RetryPersistence {
        reply: oneshot::Sender<Result<MatchOutcome, SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub match_id: MatchId,
    players: [PlayerId; 2],
    seats: [OpponentInfo; 2],
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn players(&self) -> [PlayerId; 2] {
        self.players
    }

    /// Public summary of the other seat
    pub fn opponent_of(&self, player_id: &PlayerId) -> Option<OpponentInfo> {
        match &self.seats {
            [a, b] if &a.player_id == player_id => Some(b.clone()),
            [a, b] if &b.player_id == player_id => Some(a.clone()),
            _ => None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn check_participant(&self, player_id: &PlayerId) -> Result<(), SessionError> {
        if self.players.contains(player_id) {
            Ok(())
        } else {
            Err(SessionError::NotParticipant(*player_id))
        }
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Unavailable(self.match_id))
    }

    pub async fn confirm_ready(&self, player_id: PlayerId) -> Result<(), SessionError> {
        self.check_participant(&player_id)?;
        self.send(SessionCommand::Confirm { player_id }).await
    }

    /// Queue a submission. Resolution happens asynchronously and is
    /// announced on the event channel.
    pub async fn submit_round(&self, player_id: PlayerId, submission: Submission) -> Result<(), SessionError> {
        self.check_participant(&player_id)?;
        self.send(SessionCommand::Submit {
            player_id,
            submission,
        })
        .await
    }

    pub async fn disconnect(&self, player_id: PlayerId) -> Result<(), SessionError> {
        self.check_participant(&player_id)?;
        self.send(SessionCommand::Disconnect { player_id }).await
    }

    /// Persist a completed outcome again after a persistence failure
    pub async fn retry_persistence(&self) -> Result<MatchOutcome, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::RetryPersistence { reply }).await?;
        rx.await.map_err(|_| SessionError::Unavailable(self.match_id))?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| SessionError::Unavailable(self.match_id))
    }
}

/// A freshly launched session. Each seat's receiver was subscribed before the
/// session task started, so it holds every event the session has published.
pub struct LaunchedSession {
    pub handle: SessionHandle,
    pub events: [broadcast::Receiver<SessionEvent>; 2],
}

impl LaunchedSession {
    /// The handle plus the pre-opened receiver of `player_id`'s seat
    pub fn into_seat(self, player_id: &PlayerId) -> (SessionHandle, broadcast::Receiver<SessionEvent>) {
        let [first, second] = self.events;
        let players = self.handle.players();
        let events = if &players[0] == player_id {
            first
        } else if &players[1] == player_id {
            second
        } else {
            self.handle.subscribe()
        };
        (self.handle, events)
    }
}

/// Registry of running sessions plus the player → match index
pub struct SessionRegistry {
    sessions: DashMap<MatchId, SessionHandle>,
    players: DashMap<PlayerId, MatchId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            players: DashMap::new(),
        }
    }

    pub fn get(&self, match_id: &MatchId) -> Option<SessionHandle> {
        self.sessions.get(match_id).map(|s| s.value().clone())
    }

    pub fn insert(&self, handle: SessionHandle) {
        for player_id in handle.players {
            self.players.insert(player_id, handle.match_id);
        }
        self.sessions.insert(handle.match_id, handle);
    }

    pub fn remove(&self, match_id: &MatchId) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(match_id)?;
        for player_id in handle.players {
            self.players.remove_if(&player_id, |_, current| current == match_id);
        }
        Some(handle)
    }

    /// Drop the player index for a settled match. The session itself stays
    /// reachable by match id until its task ends.
    pub fn release_players(&self, match_id: &MatchId) {
        if let Some(handle) = self.sessions.get(match_id) {
            for player_id in handle.players {
                self.players.remove_if(&player_id, |_, current| current == match_id);
            }
        }
    }

    pub fn match_for_player(&self, player_id: &PlayerId) -> Option<MatchId> {
        self.players.get(player_id).map(|m| *m.value())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Launches session tasks and tracks them in the registry
pub struct BattleService {
    registry: Arc<SessionRegistry>,
    questions: Arc<dyn QuestionBank>,
    recorder: Arc<dyn MatchRecorder>,
    rules: BattleRules,
    reward_rules: RewardRules,
}

impl BattleService {
    pub fn new(
        questions: Arc<dyn QuestionBank>,
        recorder: Arc<dyn MatchRecorder>,
        rules: BattleRules,
        reward_rules: RewardRules,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            questions,
            recorder,
            rules,
            reward_rules,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn session(&self, match_id: &MatchId) -> Option<SessionHandle> {
        self.registry.get(match_id)
    }

    pub fn current_match(&self, player_id: &PlayerId) -> Option<MatchId> {
        self.registry.match_for_player(player_id)
    }

    /// Start the session task for an already persisted match
    pub fn launch(&self, created: Match) -> LaunchedSession {
        let match_id = created.match_id;
        let session = BattleSession::new(
            created,
            self.rules.clone(),
            self.reward_rules.clone(),
            rand::random::<u64>(),
        );
        let (actor, handle) = BattleMatch::new(
            session,
            self.questions.clone(),
            self.recorder.clone(),
            self.registry.clone(),
        );

        self.registry.insert(handle.clone());
        let events = [handle.subscribe(), handle.subscribe()];

        let registry = self.registry.clone();
        tokio::spawn(async move {
            actor.run().await;

            registry.remove(&match_id);
            info!(match_id = %match_id, "Session removed from registry");
        });

        LaunchedSession { handle, events }
    }

    /// Pair `player` with a bot and start the session
    pub async fn launch_bot_match(
        &self,
        player: MatchPlayer,
        preferences: MatchPreferences,
    ) -> Result<LaunchedSession, SessionError> {
        let opponent = bot::opponent_for(&player, self.rules.bot_accuracy_percent);
        let created = Match::new(player, opponent, preferences);

        self.recorder
            .create_match(&created)
            .await
            .map_err(|e| SessionError::PersistenceFailure(e.to_string()))?;

        info!(
            match_id = %created.match_id,
            player_id = %created.players[0].player_id,
            "Created bot match"
        );
        Ok(self.launch(created))
    }
}

/// The session task
pub struct BattleMatch {
    session: BattleSession,
    commands: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    questions: Arc<dyn QuestionBank>,
    recorder: Arc<dyn MatchRecorder>,
    registry: Arc<SessionRegistry>,
    bot_rng: ChaCha8Rng,
    confirm_deadline: Instant,
    round_deadline: Option<Instant>,
    /// Set once the outcome exists; past it an unpersisted outcome is dropped
    retry_deadline: Option<Instant>,
    outcome_recorded: bool,
    ratings_written: HashSet<PlayerId>,
    persisted: bool,
    abandoned: bool,
}

impl BattleMatch {
    pub fn new(
        session: BattleSession,
        questions: Arc<dyn QuestionBank>,
        recorder: Arc<dyn MatchRecorder>,
        registry: Arc<SessionRegistry>,
    ) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::channel(64);
        let (events, _) = broadcast::channel(64);

        let handle = SessionHandle {
            match_id: session.match_info().match_id,
            players: session.match_info().player_ids(),
            seats: session.match_info().players.clone().map(|p| p.info()),
            commands: command_tx,
            events: events.clone(),
        };

        let actor = Self {
            confirm_deadline: Instant::now() + session.rules().confirm_timeout,
            session,
            commands,
            events,
            questions,
            recorder,
            registry,
            bot_rng: ChaCha8Rng::seed_from_u64(rand::random::<u64>()),
            round_deadline: None,
            retry_deadline: None,
            outcome_recorded: false,
            ratings_written: HashSet::new(),
            persisted: false,
            abandoned: false,
        };

        (actor, handle)
    }

    fn match_id(&self) -> MatchId {
        self.session.match_info().match_id
    }

    pub async fn run(mut self) {
        info!(match_id = %self.match_id(), "Session started");

        if !self.prepare().await {
            return;
        }
        self.confirm_deadline = Instant::now() + self.session.rules().confirm_timeout;

        while !self.finished() {
            let deadline = self.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        warn!(match_id = %self.match_id(), "All session handles dropped");
                        break;
                    }
                },
                _ = sleep_until_opt(deadline) => self.on_deadline().await,
            }
        }

        info!(match_id = %self.match_id(), phase = %self.session.phase(), "Session ended");
    }

    fn finished(&self) -> bool {
        match self.session.phase() {
            SessionPhase::Error => true,
            SessionPhase::Completed => self.persisted || self.abandoned,
            _ => false,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self.session.phase() {
            SessionPhase::Preparing => Some(self.confirm_deadline),
            SessionPhase::RoundActive => self.round_deadline,
            SessionPhase::Completed => self.retry_deadline,
            _ => None,
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; clients reconnect and query the snapshot
        let _ = self.events.send(event);
    }

    /// Fetch the question set. Returns false if the session cannot start.
    async fn prepare(&mut self) -> bool {
        let match_id = self.match_id();
        let preferences = &self.session.match_info().preferences;
        let filter = QuestionFilter {
            difficulty: preferences.difficulty,
            category: preferences.category.clone(),
        };
        let requested = self.session.total_rounds();

        let fetched = match self.questions.fetch_questions(&filter, requested).await {
            Ok(questions) => questions,
            Err(e) => {
                warn!(match_id = %match_id, error = %e, "Question fetch failed");
                Vec::new()
            }
        };

        match self.session.assign_questions(fetched) {
            Ok(()) => true,
            Err(err) => {
                error!(match_id = %match_id, error = %err, "Session cannot start");
                self.publish(SessionEvent::MatchError {
                    kind: MatchErrorKind::QuestionSupplyShortfall,
                    reason: err.to_string(),
                    retryable: err.is_retryable(),
                });
                false
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Confirm { player_id } => match self.session.confirm(player_id) {
                Ok(true) if self.session.phase() == SessionPhase::Preparing => self.start().await,
                Ok(_) => {}
                Err(e) => debug!(match_id = %self.match_id(), error = %e, "Confirm rejected"),
            },
            SessionCommand::Submit {
                player_id,
                submission,
            } => {
                self.accept(player_id, submission);
                self.settle_ready_rounds().await;
            }
            SessionCommand::Disconnect { player_id } => self.handle_disconnect(player_id).await,
            SessionCommand::RetryPersistence { reply } => {
                let result = self.retry_persistence().await;
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
        }
    }

    async fn on_deadline(&mut self) {
        match self.session.phase() {
            SessionPhase::Preparing => {
                info!(match_id = %self.match_id(), "Confirmation window closed, starting anyway");
                self.start().await;
            }
            SessionPhase::RoundActive => {
                self.round_deadline = None;
                self.resolve_current().await;
                self.settle_ready_rounds().await;
            }
            SessionPhase::Completed => self.abandon_outcome(),
            _ => {}
        }
    }

    /// The retry window closed without a successful write
    fn abandon_outcome(&mut self) {
        self.abandoned = true;
        self.retry_deadline = None;
        error!(match_id = %self.match_id(), "Giving up on persisting the outcome");
        self.publish(SessionEvent::MatchError {
            kind: MatchErrorKind::PersistenceFailure,
            reason: "outcome was not persisted before the retry window closed".to_string(),
            retryable: false,
        });
    }

    async fn start(&mut self) {
        if let Err(e) = self.session.begin() {
            warn!(match_id = %self.match_id(), error = %e, "Could not open first round");
            return;
        }
        self.open_round();
        self.settle_ready_rounds().await;
    }

    /// Announce the round, arm its deadline and let bots answer
    fn open_round(&mut self) {
        let limit = self.session.rules().question_time_limit;
        self.round_deadline = Some(Instant::now() + limit);

        if let Some(event) = self.session.round_started_event() {
            self.publish(event);
        }

        let round = self.session.round_index() as u32;
        let bots: Vec<(PlayerId, u32)> = self
            .session
            .match_info()
            .players
            .iter()
            .filter_map(|p| match p.kind {
                PlayerKind::Bot { accuracy_percent } => Some((p.player_id, accuracy_percent)),
                PlayerKind::Human => None,
            })
            .collect();

        for (bot_id, accuracy) in bots {
            let Some(question) = self.session.current_question() else {
                break;
            };
            let submission = bot::submission(&mut self.bot_rng, question, accuracy, limit, round);
            self.accept(bot_id, submission);
        }
    }

    fn server_remaining(&self) -> Duration {
        self.round_deadline
            .map_or(Duration::ZERO, |d| d.saturating_duration_since(Instant::now()))
    }

    fn accept(&mut self, player_id: PlayerId, submission: Submission) {
        let round = self.session.round_index() as u32;
        let remaining = self.server_remaining();
        match self.session.submit(player_id, submission, remaining) {
            Ok(SubmitOutcome::Accepted) => {
                self.publish(SessionEvent::PlayerSubmitted { round, player_id });
            }
            Ok(outcome) => {
                debug!(match_id = %self.match_id(), player_id = %player_id, ?outcome, "Submission ignored");
            }
            Err(e) => {
                debug!(match_id = %self.match_id(), player_id = %player_id, error = %e, "Submission rejected");
            }
        }
    }

    async fn handle_disconnect(&mut self, player_id: PlayerId) {
        if self.session.phase().is_terminal() {
            return;
        }

        if self.session.rules().forfeit_on_disconnect {
            match self.session.forfeit(player_id) {
                Ok(()) => {
                    info!(match_id = %self.match_id(), player_id = %player_id, "Player forfeited by disconnecting");
                    self.round_deadline = None;
                    let _ = self.finish().await;
                }
                Err(e) => debug!(match_id = %self.match_id(), error = %e, "Forfeit rejected"),
            }
            return;
        }

        if let Err(e) = self.session.mark_absent(player_id) {
            debug!(match_id = %self.match_id(), error = %e, "Disconnect ignored");
            return;
        }
        info!(match_id = %self.match_id(), player_id = %player_id, "Player disconnected, rounds will time out");
        self.settle_ready_rounds().await;
    }

    /// Resolve rounds for as long as every present player has answered
    async fn settle_ready_rounds(&mut self) {
        while self.session.ready_to_resolve() {
            self.resolve_current().await;
        }
    }

    async fn resolve_current(&mut self) {
        let Some(resolution) = self.session.resolve_round() else {
            return;
        };
        self.round_deadline = None;
        self.publish(resolution.event());

        match self.session.phase() {
            SessionPhase::Completed => {
                let _ = self.finish().await;
            }
            SessionPhase::RoundActive => self.open_round(),
            _ => {}
        }
    }

    /// Persist the outcome and announce completion
    async fn finish(&mut self) -> Result<MatchOutcome, SessionError> {
        let Some(outcome) = self.session.outcome().cloned() else {
            return Err(SessionError::InvalidPhase(self.session.phase()));
        };

        // Settled players may queue again while persistence is pending
        self.registry.release_players(&outcome.match_id);
        if self.retry_deadline.is_none() {
            self.retry_deadline = Some(Instant::now() + self.session.rules().persist_retry_window);
        }

        match self.persist_with_retries(&outcome).await {
            Ok(()) => {
                self.persisted = true;
                self.retry_deadline = None;
                info!(
                    match_id = %outcome.match_id,
                    winner = ?outcome.winner_id,
                    rounds = outcome.rounds_played,
                    "Match completed"
                );
                self.publish(SessionEvent::MatchCompleted {
                    outcome: outcome.clone(),
                });
                Ok(outcome)
            }
            Err(err) => {
                error!(match_id = %outcome.match_id, error = %err, "Outcome not persisted");
                self.publish(SessionEvent::MatchError {
                    kind: MatchErrorKind::PersistenceFailure,
                    reason: err.to_string(),
                    retryable: err.is_retryable(),
                });
                Err(err)
            }
        }
    }

    async fn retry_persistence(&mut self) -> Result<MatchOutcome, SessionError> {
        if self.abandoned {
            return Err(SessionError::Unavailable(self.match_id()));
        }
        if self.persisted {
            return self
                .session
                .outcome()
                .cloned()
                .ok_or(SessionError::InvalidPhase(self.session.phase()));
        }
        self.finish().await
    }

    async fn persist_with_retries(&mut self, outcome: &MatchOutcome) -> Result<(), SessionError> {
        let attempts = self.session.rules().persist_attempts.max(1);
        let backoff = self.session.rules().persist_backoff;
        let mut attempt = 1;
        loop {
            match self.persist(outcome).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(match_id = %outcome.match_id, attempt, error = %e, "Persisting outcome failed, retrying");
                    sleep(backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(SessionError::PersistenceFailure(e.to_string())),
            }
        }
    }

    /// Outcome first, then the human ratings it changed. Steps that already
    /// succeeded are skipped on later attempts.
    async fn persist(&mut self, outcome: &MatchOutcome) -> Result<(), StoreError> {
        if !self.outcome_recorded {
            self.recorder.record_outcome(outcome).await?;
            self.outcome_recorded = true;
        }

        for reward in &outcome.rewards {
            if self.ratings_written.contains(&reward.player_id) {
                continue;
            }
            let human = self
                .session
                .match_info()
                .player(&reward.player_id)
                .is_some_and(|p| !p.kind.is_bot());
            if human && reward.rating_delta != 0 {
                self.recorder
                    .upsert_rating(reward.player_id, reward.rating_before + reward.rating_delta)
                    .await?;
                self.ratings_written.insert(reward.player_id);
            }
        }
        Ok(())
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
