//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::error::SessionError;
use crate::game::session::Submission;
use crate::game::{LaunchedSession, SessionHandle};
use crate::http::middleware::verify_jwt;
use crate::matchmaking::QueueSubscription;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, MatchId, PlayerId, QueueEvent, ServerMsg, SessionEvent};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            info!(player_id = %claims.sub, "WebSocket upgrade for authenticated player");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

type Outbound = mpsc::UnboundedSender<ServerMsg>;

/// Match whose session events this connection currently relays
type Following = Arc<Mutex<Option<MatchId>>>;

/// Per-connection state for the reader loop
struct Connection {
    player_id: PlayerId,
    state: AppState,
    out: Outbound,
    rate_limiter: ConnectionRateLimiter,
    /// Forwards queue and session events for the current match attempt
    forwarder: Option<JoinHandle<()>>,
    following: Following,
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: PlayerId, state: AppState) {
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out, mut out_rx) = mpsc::unbounded_channel::<ServerMsg>();

    // Spawn writer task: outbound messages -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let _ = out.send(ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    });

    let mut conn = Connection::new(player_id, state, out);

    // Reader loop: WebSocket -> matchmaking and sessions
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !conn.rate_limiter.check_frame() {
                    warn!(player_id = %player_id, "Rate limited client frame");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => conn.dispatch(msg).await,
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        conn.send_error("invalid_message", e.to_string());
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    conn.close().await;
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

impl Connection {
    fn new(player_id: PlayerId, state: AppState, out: Outbound) -> Self {
        Self {
            player_id,
            state,
            out,
            rate_limiter: ConnectionRateLimiter::new(),
            forwarder: None,
            following: Arc::new(Mutex::new(None)),
        }
    }

    async fn dispatch(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::JoinQueue { preferences } => {
                if !self.rate_limiter.check_matchmaking() {
                    self.send_error("rate_limited", "Too many matchmaking requests".to_string());
                    return;
                }
                match self.state.matchmaking.join_queue(self.player_id, preferences).await {
                    Ok(subscription) => {
                        let following = self.following.clone();
                        let out = self.out.clone();
                        self.replace_forwarder(tokio::spawn(forward_queue(subscription, following, out)));
                    }
                    Err(e) => self.send_error(e.code(), e.to_string()),
                }
            }
            ClientMsg::LeaveQueue => {
                // Dropping the entry ends the queue forwarder
                self.state.matchmaking.leave(self.player_id).await;
            }
            ClientMsg::PracticeBot { preferences } => {
                if !self.rate_limiter.check_matchmaking() {
                    self.send_error("rate_limited", "Too many matchmaking requests".to_string());
                    return;
                }
                match self.state.matchmaking.practice_bot(self.player_id, preferences).await {
                    Ok(launched) => self.follow_bot_match(launched),
                    Err(e) => self.send_error(e.code(), e.to_string()),
                }
            }
            ClientMsg::Ready { match_id } => {
                let result = match self.session(match_id) {
                    Ok(handle) => {
                        self.follow(&handle);
                        handle.confirm_ready(self.player_id).await
                    }
                    Err(e) => Err(e),
                };
                self.report(result);
            }
            ClientMsg::SubmitRound {
                match_id,
                round,
                action,
                answer,
                time_remaining_ms,
            } => {
                let submission = Submission {
                    action,
                    answer,
                    time_remaining: Duration::from_millis(time_remaining_ms),
                    round,
                };
                let result = match self.session(match_id) {
                    Ok(handle) => handle.submit_round(self.player_id, submission).await,
                    Err(e) => Err(e),
                };
                self.report(result);
            }
            ClientMsg::RetryPersistence { match_id } => {
                // Success is announced as MatchCompleted on the session stream
                let result = match self.session(match_id) {
                    Ok(handle) => handle.retry_persistence().await.map(|_| ()),
                    Err(e) => Err(e),
                };
                self.report(result);
            }
            ClientMsg::Ping { t } => {
                let _ = self.out.send(ServerMsg::Pong { t });
            }
        }
    }

    fn session(&self, match_id: MatchId) -> Result<SessionHandle, SessionError> {
        self.state
            .battles
            .session(&match_id)
            .ok_or(SessionError::NotFound(match_id))
    }

    fn follow_bot_match(&mut self, launched: LaunchedSession) {
        let (handle, events) = launched.into_seat(&self.player_id);
        let Some(opponent) = handle.opponent_of(&self.player_id) else {
            return;
        };
        *self.following.lock() = Some(handle.match_id);
        let _ = self.out.send(ServerMsg::Queue {
            event: QueueEvent::Matched {
                match_id: handle.match_id,
                opponent,
            },
        });
        let (following, out) = (self.following.clone(), self.out.clone());
        self.replace_forwarder(tokio::spawn(forward_session(events, handle.match_id, following, out)));
    }

    /// Attach to a session this connection does not relay yet, e.g. after a
    /// reconnect. The receiver is opened before the ready is delivered.
    fn follow(&mut self, handle: &SessionHandle) {
        if !handle.players().contains(&self.player_id) || *self.following.lock() == Some(handle.match_id) {
            return;
        }
        debug!(player_id = %self.player_id, match_id = %handle.match_id, "Attaching to running session");
        *self.following.lock() = Some(handle.match_id);
        let events = handle.subscribe();
        let (following, out) = (self.following.clone(), self.out.clone());
        self.replace_forwarder(tokio::spawn(forward_session(events, handle.match_id, following, out)));
    }

    fn replace_forwarder(&mut self, forwarder: JoinHandle<()>) {
        if let Some(previous) = self.forwarder.replace(forwarder) {
            previous.abort();
        }
    }

    fn report(&self, result: Result<(), SessionError>) {
        if let Err(e) = result {
            debug!(player_id = %self.player_id, error = %e, "Session request rejected");
            self.send_error(e.code(), e.to_string());
        }
    }

    fn send_error(&self, code: &str, message: String) {
        let _ = self.out.send(ServerMsg::Error {
            code: code.to_string(),
            message,
        });
    }

    /// Transport close: leave the queue and tell a running session
    async fn close(mut self) {
        self.state.matchmaking.leave(self.player_id).await;

        if let Some(match_id) = self.state.battles.current_match(&self.player_id) {
            if let Some(handle) = self.state.battles.session(&match_id) {
                if let Err(e) = handle.disconnect(self.player_id).await {
                    debug!(player_id = %self.player_id, error = %e, "Disconnect not delivered");
                }
            }
        }

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Relay queue events; on `Matched`, follow the new session
async fn forward_queue(mut subscription: QueueSubscription, following: Following, out: Outbound) {
    while let Some(event) = subscription.recv().await {
        let matched = match &event {
            QueueEvent::Matched { match_id, .. } => Some(*match_id),
            _ => None,
        };
        let Some(match_id) = matched else {
            if out.send(ServerMsg::Queue { event }).is_err() {
                return;
            }
            continue;
        };

        // Opened when the session was launched, so events published before
        // this point (a question shortfall included) are still queued
        let events = subscription.take_session_events();
        if events.is_some() {
            *following.lock() = Some(match_id);
        }
        if out.send(ServerMsg::Queue { event }).is_err() {
            return;
        }
        match events {
            Some(events) => forward_session(events, match_id, following, out).await,
            None => warn!(match_id = %match_id, "Matched without a session stream"),
        }
        return;
    }
}

/// Relay session events until the match is settled
async fn forward_session(
    mut events: broadcast::Receiver<SessionEvent>,
    match_id: MatchId,
    following: Following,
    out: Outbound,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let last = match &event {
                    SessionEvent::MatchCompleted { .. } => true,
                    SessionEvent::MatchError { retryable, .. } => !retryable,
                    _ => false,
                };
                if out.send(ServerMsg::Session { match_id, event }).is_err() || last {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(match_id = %match_id, lagged_count = n, "Client lagged, skipping session events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(match_id = %match_id, "Session event channel closed");
                break;
            }
        }
    }

    let mut following = following.lock();
    if *following == Some(match_id) {
        *following = None;
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
