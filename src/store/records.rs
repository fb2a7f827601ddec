//! Match and outcome persistence

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::game::Match;
use crate::ws::protocol::{MatchOutcome, PlayerReward, PlayerTotals};

use super::supabase::SupabaseClient;
use super::{MatchRecorder, StoreError};

/// Row inserted into `matches` when a pair is made
#[derive(Debug, Clone, Serialize)]
struct NewMatchRow {
    id: Uuid,
    player_one: Uuid,
    player_two: Uuid,
    mode: Option<String>,
    created_at: DateTime<Utc>,
}

/// Row inserted into `match_outcomes` once a match completes
#[derive(Debug, Clone, Serialize)]
struct OutcomeRow<'a> {
    match_id: Uuid,
    winner_id: Option<Uuid>,
    forfeited_by: Option<Uuid>,
    rounds_played: u32,
    final_scores: &'a [PlayerTotals],
    rewards: &'a [PlayerReward],
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
struct RatingUpdate {
    id: Uuid,
    rating: i32,
}

#[derive(Clone)]
pub struct SupabaseMatchRecorder {
    client: SupabaseClient,
}

impl SupabaseMatchRecorder {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

impl MatchRecorder for SupabaseMatchRecorder {
    fn create_match<'a>(&'a self, created: &'a Match) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let [one, two] = &created.players;
            let row = NewMatchRow {
                id: created.match_id,
                player_one: one.player_id,
                player_two: two.player_id,
                mode: created.preferences.mode.clone(),
                created_at: created.created_at,
            };
            self.client.insert("matches", &row).await
        })
    }

    fn record_outcome<'a>(&'a self, outcome: &'a MatchOutcome) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let row = OutcomeRow {
                match_id: outcome.match_id,
                winner_id: outcome.winner_id,
                forfeited_by: outcome.forfeited_by,
                rounds_played: outcome.rounds_played,
                final_scores: &outcome.final_scores,
                rewards: &outcome.rewards,
                completed_at: outcome.completed_at,
            };
            // Upsert keeps retries after a partial failure idempotent
            self.client.upsert("match_outcomes", &row, "match_id").await
        })
    }

    fn upsert_rating(&self, player_id: Uuid, rating: i32) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let update = RatingUpdate {
                id: player_id,
                rating,
            };
            self.client.upsert("profiles", &update, "id").await
        })
    }
}
