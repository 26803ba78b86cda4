use async_trait::async_trait;
use uuid::Uuid;

use crate::rank::{PlayerRank, RankDefinition, VerificationState};
use crate::xp::XpEvent;

/// A Discord account linked to a player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscordIdentity {
    pub user_id: u64,
    pub username: String,
}

/// The persistence collaborator the core is built against.
///
/// Implementations live elsewhere (Postgres in `warden-database`); the core
/// only relies on this interface, which keeps every flow testable with an
/// in-memory stand-in.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_player_rank(&self, player_uuid: Uuid) -> anyhow::Result<Option<PlayerRank>>;

    /// Upsert a player record. `Ok(false)` means storage declined the write
    /// without an infrastructure error.
    async fn save_player_rank(&self, rank: &PlayerRank) -> anyhow::Result<bool>;

    /// Append an accepted XP event to the audit log.
    async fn log_xp_gain(&self, event: &XpEvent) -> anyhow::Result<()>;

    async fn log_achievement(&self, player_uuid: Uuid, achievement: &str) -> anyhow::Result<()>;

    /// Count logged events for one (player, type, source) key with
    /// `from <= occurred_at <= to`, in unix seconds. Backs the sliding
    /// rate-limit windows, so counts must survive restarts.
    async fn get_xp_event_count(
        &self,
        player_uuid: Uuid,
        event_type: &str,
        event_source: &str,
        from: u64,
        to: u64,
    ) -> anyhow::Result<i64>;

    async fn update_verification_state(
        &self,
        player_uuid: Uuid,
        state: VerificationState,
    ) -> anyhow::Result<bool>;

    async fn link_discord_identity(
        &self,
        player_uuid: Uuid,
        discord_user_id: u64,
        discord_username: &str,
    ) -> anyhow::Result<bool>;

    async fn get_discord_identity(
        &self,
        player_uuid: Uuid,
    ) -> anyhow::Result<Option<DiscordIdentity>>;

    /// Reverse lookup for command surfaces keyed by Discord account.
    async fn player_uuid_for_discord(
        &self,
        discord_user_id: u64,
    ) -> anyhow::Result<Option<Uuid>>;

    async fn get_all_rank_definitions(&self) -> anyhow::Result<Vec<RankDefinition>>;
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::{DiscordIdentity, Storage};
    use crate::rank::{PlayerRank, RankDefinition, VerificationState};
    use crate::xp::XpEvent;

    #[derive(Default)]
    pub struct MemoryState {
        pub ranks: HashMap<Uuid, PlayerRank>,
        pub events: Vec<XpEvent>,
        pub achievements: Vec<(Uuid, String)>,
        pub identities: HashMap<Uuid, DiscordIdentity>,
        pub definitions: Vec<RankDefinition>,
    }

    /// In-memory [`Storage`] stand-in with failure/latency switches for
    /// exercising the error paths.
    #[derive(Default)]
    pub struct MemoryStorage {
        pub state: Mutex<MemoryState>,
        pub fail_counts: AtomicBool,
        pub fail_saves: AtomicBool,
        pub read_delay_ms: AtomicU64,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_rank(&self, rank: PlayerRank) {
            self.state.lock().await.ranks.insert(rank.player_uuid, rank);
        }

        pub async fn push_event(&self, event: XpEvent) {
            self.state.lock().await.events.push(event);
        }

        pub async fn event_count(&self) -> usize {
            self.state.lock().await.events.len()
        }

        pub async fn rank_of(&self, player_uuid: Uuid) -> Option<PlayerRank> {
            self.state.lock().await.ranks.get(&player_uuid).cloned()
        }

        async fn maybe_delay(&self) {
            let delay = self.read_delay_ms.load(Ordering::Relaxed);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn get_player_rank(
            &self,
            player_uuid: Uuid,
        ) -> anyhow::Result<Option<PlayerRank>> {
            self.maybe_delay().await;
            Ok(self.state.lock().await.ranks.get(&player_uuid).cloned())
        }

        async fn save_player_rank(&self, rank: &PlayerRank) -> anyhow::Result<bool> {
            if self.fail_saves.load(Ordering::Relaxed) {
                anyhow::bail!("simulated save failure");
            }
            self.state
                .lock()
                .await
                .ranks
                .insert(rank.player_uuid, rank.clone());
            Ok(true)
        }

        async fn log_xp_gain(&self, event: &XpEvent) -> anyhow::Result<()> {
            self.state.lock().await.events.push(event.clone());
            Ok(())
        }

        async fn log_achievement(
            &self,
            player_uuid: Uuid,
            achievement: &str,
        ) -> anyhow::Result<()> {
            self.state
                .lock()
                .await
                .achievements
                .push((player_uuid, achievement.to_owned()));
            Ok(())
        }

        async fn get_xp_event_count(
            &self,
            player_uuid: Uuid,
            event_type: &str,
            event_source: &str,
            from: u64,
            to: u64,
        ) -> anyhow::Result<i64> {
            if self.fail_counts.load(Ordering::Relaxed) {
                anyhow::bail!("simulated count failure");
            }
            let state = self.state.lock().await;
            let count = state
                .events
                .iter()
                .filter(|event| {
                    event.player_uuid == player_uuid
                        && event.event_type == event_type
                        && event.event_source == event_source
                        && event.occurred_at >= from
                        && event.occurred_at <= to
                })
                .count();
            Ok(count as i64)
        }

        async fn update_verification_state(
            &self,
            player_uuid: Uuid,
            state: VerificationState,
        ) -> anyhow::Result<bool> {
            let mut inner = self.state.lock().await;
            match inner.ranks.get_mut(&player_uuid) {
                Some(rank) => {
                    rank.state = state;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn link_discord_identity(
            &self,
            player_uuid: Uuid,
            discord_user_id: u64,
            discord_username: &str,
        ) -> anyhow::Result<bool> {
            self.state.lock().await.identities.insert(
                player_uuid,
                DiscordIdentity {
                    user_id: discord_user_id,
                    username: discord_username.to_owned(),
                },
            );
            Ok(true)
        }

        async fn get_discord_identity(
            &self,
            player_uuid: Uuid,
        ) -> anyhow::Result<Option<DiscordIdentity>> {
            Ok(self.state.lock().await.identities.get(&player_uuid).cloned())
        }

        async fn player_uuid_for_discord(
            &self,
            discord_user_id: u64,
        ) -> anyhow::Result<Option<Uuid>> {
            Ok(self
                .state
                .lock()
                .await
                .identities
                .iter()
                .find(|(_, identity)| identity.user_id == discord_user_id)
                .map(|(uuid, _)| *uuid))
        }

        async fn get_all_rank_definitions(&self) -> anyhow::Result<Vec<RankDefinition>> {
            Ok(self.state.lock().await.definitions.clone())
        }
    }
}
