use async_trait::async_trait;
use uuid::Uuid;

use warden_core::rank::{PlayerRank, RankDefinition, VerificationState};
use warden_core::storage::{DiscordIdentity, Storage};
use warden_core::xp::XpEvent;

use crate::cache::PLAYER_RANK_CACHE_TTL;
use crate::database::Database;
use crate::impls;

/// Postgres-backed [`Storage`] with a read-through cache on player records.
#[async_trait]
impl Storage for Database {
    async fn get_player_rank(&self, player_uuid: Uuid) -> anyhow::Result<Option<PlayerRank>> {
        let key = self.cache().player_rank_key(player_uuid);
        self.cache()
            .get_or_load_json(&key, PLAYER_RANK_CACHE_TTL, || {
                impls::player_ranks::get_player_rank(self, player_uuid)
            })
            .await
    }

    async fn save_player_rank(&self, rank: &PlayerRank) -> anyhow::Result<bool> {
        let saved = impls::player_ranks::save_player_rank(self, rank).await?;
        if saved {
            let key = self.cache().player_rank_key(rank.player_uuid);
            let _ = self.cache().del(&key).await;
        }
        Ok(saved)
    }

    async fn log_xp_gain(&self, event: &XpEvent) -> anyhow::Result<()> {
        impls::xp_events::insert_xp_event(self, event).await
    }

    async fn log_achievement(&self, player_uuid: Uuid, achievement: &str) -> anyhow::Result<()> {
        impls::xp_events::insert_achievement(self, player_uuid, achievement).await
    }

    async fn get_xp_event_count(
        &self,
        player_uuid: Uuid,
        event_type: &str,
        event_source: &str,
        from: u64,
        to: u64,
    ) -> anyhow::Result<i64> {
        impls::xp_events::count_xp_events(self, player_uuid, event_type, event_source, from, to)
            .await
    }

    async fn update_verification_state(
        &self,
        player_uuid: Uuid,
        state: VerificationState,
    ) -> anyhow::Result<bool> {
        let updated = impls::verification::update_verification_state(self, player_uuid, state)
            .await?;
        if updated {
            let key = self.cache().player_rank_key(player_uuid);
            let _ = self.cache().del(&key).await;
        }
        Ok(updated)
    }

    async fn link_discord_identity(
        &self,
        player_uuid: Uuid,
        discord_user_id: u64,
        discord_username: &str,
    ) -> anyhow::Result<bool> {
        impls::verification::link_discord_identity(
            self,
            player_uuid,
            discord_user_id,
            discord_username,
        )
        .await
    }

    async fn get_discord_identity(
        &self,
        player_uuid: Uuid,
    ) -> anyhow::Result<Option<DiscordIdentity>> {
        impls::verification::get_discord_identity(self, player_uuid).await
    }

    async fn player_uuid_for_discord(
        &self,
        discord_user_id: u64,
    ) -> anyhow::Result<Option<Uuid>> {
        impls::verification::player_uuid_for_discord(self, discord_user_id).await
    }

    async fn get_all_rank_definitions(&self) -> anyhow::Result<Vec<RankDefinition>> {
        impls::rank_definitions::get_all_rank_definitions(self).await
    }
}
