//! Collaborator interfaces and their implementations
//!
//! The engine talks to the question bank, the profile store and the
//! persistence layer only through the traits below. `memory` backs local
//! runs and tests; the Supabase types back production.

pub mod memory;
pub mod profiles;
pub mod questions;
pub mod records;
pub mod supabase;

use futures::future::BoxFuture;

use crate::game::Match;
use crate::ws::protocol::{MatchOutcome, PlayerId};

pub use memory::InMemoryStore;
pub use profiles::SupabaseProfileStore;
pub use questions::{Question, QuestionFilter, SupabaseQuestionBank};
pub use records::SupabaseMatchRecorder;
pub use supabase::SupabaseClient;

/// Rating and level used when a player joins the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerProfile {
    pub rating: i32,
    pub level: u32,
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self {
            rating: 1000,
            level: 1,
        }
    }
}

pub trait QuestionBank: Send + Sync {
    /// May return fewer questions than requested
    fn fetch_questions<'a>(
        &'a self,
        filter: &'a QuestionFilter,
        count: usize,
    ) -> BoxFuture<'a, Result<Vec<Question>, StoreError>>;
}

pub trait ProfileStore: Send + Sync {
    fn rating_and_level(&self, player_id: PlayerId) -> BoxFuture<'_, Result<PlayerProfile, StoreError>>;
}

pub trait MatchRecorder: Send + Sync {
    fn create_match<'a>(&'a self, created: &'a Match) -> BoxFuture<'a, Result<(), StoreError>>;

    fn record_outcome<'a>(&'a self, outcome: &'a MatchOutcome) -> BoxFuture<'a, Result<(), StoreError>>;

    fn upsert_rating(&self, player_id: PlayerId, rating: i32) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
