//! Application state shared across routes

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::game::BattleService;
use crate::matchmaking::MatchmakingService;
use crate::store::{
    InMemoryStore, MatchRecorder, ProfileStore, QuestionBank, SupabaseClient, SupabaseMatchRecorder,
    SupabaseProfileStore, SupabaseQuestionBank,
};

/// Questions generated for local runs without Supabase
const LOCAL_QUESTION_COUNT: usize = 60;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matchmaking: Arc<MatchmakingService>,
    pub battles: Arc<BattleService>,
}

impl AppState {
    /// Supabase collaborators when configured, in-memory ones otherwise
    pub fn new(config: Config) -> Self {
        match config.supabase.clone() {
            Some(supabase) => {
                info!(url = %supabase.url, "Using Supabase collaborators");
                let client = SupabaseClient::new(&supabase);
                Self::with_collaborators(
                    config,
                    Arc::new(SupabaseQuestionBank::new(client.clone())),
                    Arc::new(SupabaseProfileStore::new(client.clone())),
                    Arc::new(SupabaseMatchRecorder::new(client)),
                )
            }
            None => {
                warn!("Supabase not configured, using in-memory collaborators");
                let store = Arc::new(InMemoryStore::with_generated_questions(LOCAL_QUESTION_COUNT));
                Self::with_collaborators(config, store.clone(), store.clone(), store)
            }
        }
    }

    pub fn with_collaborators(
        config: Config,
        questions: Arc<dyn QuestionBank>,
        profiles: Arc<dyn ProfileStore>,
        recorder: Arc<dyn MatchRecorder>,
    ) -> Self {
        let config = Arc::new(config);

        let battles = Arc::new(BattleService::new(
            questions,
            recorder.clone(),
            config.battle.clone(),
            config.rewards.clone(),
        ));

        // Initialize matchmaking service (Arc for sharing across cloned AppState)
        let matchmaking = Arc::new(MatchmakingService::new(
            config.matchmaking.clone(),
            profiles,
            recorder,
            battles.clone(),
        ));

        Self {
            config,
            matchmaking,
            battles,
        }
    }
}
