//! Player rating and level lookups

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::SupabaseClient;
use super::{PlayerProfile, ProfileStore, StoreError};

/// Rating columns of the `profiles` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: Uuid,
    pub rating: i32,
    pub level: u32,
}

/// Profile store operations
#[derive(Clone)]
pub struct SupabaseProfileStore {
    client: SupabaseClient,
}

impl SupabaseProfileStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Get a profile row by player ID
    pub async fn get_profile(&self, player_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        let query = format!("select=id,rating,level&id=eq.{}", player_id);
        self.client.get_one("profiles", &query).await
    }

    /// Get or create profile (ensures a rated profile exists)
    pub async fn ensure_profile(&self, player_id: Uuid) -> Result<PlayerProfile, StoreError> {
        match self.get_profile(player_id).await? {
            Some(row) => Ok(PlayerProfile {
                rating: row.rating,
                level: row.level,
            }),
            None => {
                let profile = PlayerProfile::default();
                let row = ProfileRow {
                    id: player_id,
                    rating: profile.rating,
                    level: profile.level,
                };
                self.client.upsert("profiles", &row, "id").await?;
                Ok(profile)
            }
        }
    }
}

impl ProfileStore for SupabaseProfileStore {
    fn rating_and_level(&self, player_id: Uuid) -> BoxFuture<'_, Result<PlayerProfile, StoreError>> {
        Box::pin(self.ensure_profile(player_id))
    }
}
