use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::now_unix_secs;
use crate::config::{RankNames, WardenSettings};
use crate::gate::{Gate, LoginDecision, ProxyControl};
use crate::rank::{
    PlayerRank, ProgressionEngine, RankDefinition, RankDefinitionCache, VerificationState,
};
use crate::rewards::{EconomyService, Messenger, PermissionsService, RewardDispatcher};
use crate::session::{SessionRegistry, VerificationSession};
use crate::storage::Storage;
use crate::xp::XpLedger;

/// Event type for achievement/advancement gameplay events.
pub const EVENT_TYPE_ADVANCEMENT: &str = "advancement";
/// Event type for accumulated-playtime events.
pub const EVENT_TYPE_PLAYTIME: &str = "playtime";

/// Everything a command or HTTP handler needs to know about a player's
/// progression in one lookup.
pub struct RankSummary {
    pub rank: PlayerRank,
    pub display: String,
    pub next: Option<Arc<RankDefinition>>,
}

/// The assembled verification-and-progression core.
///
/// Owns the session registry, XP ledger, rank engine, and reward
/// dispatcher, and wires them to the storage/proxy/Discord collaborators.
/// Command handlers and the proxy-facing HTTP surface talk to this type
/// only.
pub struct Warden {
    storage: Arc<dyn Storage>,
    proxy: Arc<dyn ProxyControl>,
    sessions: Arc<SessionRegistry>,
    ledger: XpLedger,
    definitions: Arc<RankDefinitionCache>,
    engine: ProgressionEngine,
    rewards: Arc<RewardDispatcher>,
    gate: Gate,
    names: RankNames,
    completion_timeout: Duration,
}

impl Warden {
    pub fn new(
        settings: WardenSettings,
        storage: Arc<dyn Storage>,
        proxy: Arc<dyn ProxyControl>,
        economy: Arc<dyn EconomyService>,
        permissions: Arc<dyn PermissionsService>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(settings.verification.clone()));
        let definitions = Arc::new(RankDefinitionCache::with_defaults());
        let engine = ProgressionEngine::new(definitions.clone());
        let ledger = XpLedger::new(settings.xp_limits, settings.modifiers, settings.catalog);
        let rewards = Arc::new(RewardDispatcher::new(
            economy,
            permissions,
            messenger,
            settings.roles,
            settings.names.clone(),
            settings.announce_channel,
        ));
        let gate = Gate::new(
            storage.clone(),
            sessions.clone(),
            Duration::from_millis(settings.gate_timeout_millis),
            settings.verification.default_allowed_server.clone(),
        );

        Self {
            storage,
            proxy,
            sessions,
            ledger,
            definitions,
            engine,
            rewards,
            gate,
            names: settings.names,
            completion_timeout: Duration::from_secs(
                settings.verification.completion_timeout_seconds,
            ),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn names(&self) -> &RankNames {
        &self.names
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// In-game "request a code" entry point.
    pub async fn request_code(&self, username: &str) -> String {
        self.sessions.create_session(username).await
    }

    /// Discord "request a code" entry point; seeds the identity link so
    /// completion can bind the accounts.
    pub async fn request_code_for_discord(
        &self,
        username: &str,
        discord_user_id: u64,
        discord_username: &str,
    ) -> String {
        self.sessions
            .create_session_with_identity(username, discord_user_id, discord_username)
            .await
    }

    /// In-game "submit code" entry point: validate, then complete.
    pub async fn submit_code(
        &self,
        username: &str,
        code: &str,
        player_uuid: Uuid,
    ) -> anyhow::Result<bool> {
        if !self.sessions.validate_code(username, code).await {
            return Ok(false);
        }
        self.complete_verification(username, player_uuid).await
    }

    /// Turn a validated session into a verified player.
    ///
    /// Ordering is deliberate: mark used → persist VERIFIED (+identity
    /// link) → drop the session → lift the proxy restriction → dispatch
    /// rewards. The session is gone before reward work starts, so a reward
    /// failure can never block unlocking gameplay. Persistence failures
    /// propagate (fail closed); the whole persistence phase runs under a
    /// bounded timeout.
    pub async fn complete_verification(
        &self,
        username: &str,
        player_uuid: Uuid,
    ) -> anyhow::Result<bool> {
        let Some(session) = self.sessions.mark_used(username).await else {
            return Ok(false);
        };

        match timeout(
            self.completion_timeout,
            self.persist_verification(&session, player_uuid),
        )
        .await
        {
            Err(_) => anyhow::bail!("verification persistence timed out for {username}"),
            Ok(result) => result?,
        }

        self.sessions.remove_session(username).await;

        if !self.proxy.lift_restriction(username, player_uuid).await {
            warn!(username, player = %player_uuid, "proxy did not confirm restriction lift");
        }

        self.rewards
            .on_verified(player_uuid, session.discord_user_id)
            .await;

        info!(username, player = %player_uuid, "verification completed");
        Ok(true)
    }

    async fn persist_verification(
        &self,
        session: &VerificationSession,
        player_uuid: Uuid,
    ) -> anyhow::Result<()> {
        let now = now_unix_secs();
        let mut rank = match self.storage.get_player_rank(player_uuid).await? {
            Some(rank) => rank,
            None => PlayerRank::initial(player_uuid, now),
        };
        rank.state = VerificationState::Verified;
        rank.verified_at.get_or_insert(now);

        let saved = self.storage.save_player_rank(&rank).await?;
        anyhow::ensure!(
            saved,
            "storage refused to persist verification for {player_uuid}"
        );
        self.storage
            .update_verification_state(player_uuid, VerificationState::Verified)
            .await?;

        if let (Some(id), Some(name)) = (
            session.discord_user_id,
            session.discord_username.as_deref(),
        ) {
            if !self.storage.link_discord_identity(player_uuid, id, name).await? {
                warn!(player = %player_uuid, "discord identity link not recorded");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // XP and progression
    // ------------------------------------------------------------------

    /// Gameplay-event ingestion: rate-limit, record, then follow up with
    /// achievement bookkeeping and a promotion check. Returns whether the
    /// event was accepted.
    pub async fn record_xp(
        &self,
        player_uuid: Uuid,
        event_type: &str,
        event_source: &str,
        base_xp: i64,
        server_name: &str,
        metadata: Option<serde_json::Value>,
    ) -> anyhow::Result<bool> {
        let accepted = self
            .ledger
            .process_xp_gain(
                self.storage.as_ref(),
                player_uuid,
                event_type,
                event_source,
                base_xp,
                server_name,
                metadata,
            )
            .await?;
        if !accepted {
            return Ok(false);
        }

        if event_type == EVENT_TYPE_ADVANCEMENT
            && self.ledger.catalog().get(event_source).is_some()
        {
            self.record_achievement(player_uuid, event_source).await?;
        }

        self.check_promotion(player_uuid).await;
        Ok(true)
    }

    /// Periodic playtime flush from the proxy: accumulate minutes, feed the
    /// ledger its rate-limited playtime XP, re-check promotion.
    pub async fn record_play_time(
        &self,
        player_uuid: Uuid,
        minutes: i64,
        server_name: &str,
    ) -> anyhow::Result<bool> {
        if minutes <= 0 {
            return Ok(false);
        }
        let Some(mut rank) = self.storage.get_player_rank(player_uuid).await? else {
            return Ok(false);
        };
        rank.play_time_minutes += minutes;
        let saved = self.storage.save_player_rank(&rank).await?;
        anyhow::ensure!(saved, "storage refused to persist playtime for {player_uuid}");

        let _accepted = self
            .ledger
            .process_xp_gain(
                self.storage.as_ref(),
                player_uuid,
                EVENT_TYPE_PLAYTIME,
                server_name,
                minutes,
                server_name,
                None,
            )
            .await?;

        self.check_promotion(player_uuid).await;
        Ok(true)
    }

    async fn record_achievement(
        &self,
        player_uuid: Uuid,
        achievement: &str,
    ) -> anyhow::Result<()> {
        self.storage.log_achievement(player_uuid, achievement).await?;

        if let Some(mut rank) = self.storage.get_player_rank(player_uuid).await? {
            rank.achievements_completed += 1;
            if !self.storage.save_player_rank(&rank).await? {
                warn!(player = %player_uuid, "achievement count not persisted");
            }
        }
        Ok(())
    }

    /// Apply a due promotion and fan out its rewards in the background.
    /// Promotion failures are logged, never propagated into the XP path
    /// that triggered the check.
    async fn check_promotion(&self, player_uuid: Uuid) {
        match self.engine.try_promote(self.storage.as_ref(), player_uuid).await {
            Ok(Some(promotion)) => {
                let rewards = self.rewards.clone();
                let storage = self.storage.clone();
                tokio::spawn(async move {
                    let discord_user_id = match storage.get_discord_identity(player_uuid).await {
                        Ok(identity) => identity.map(|identity| identity.user_id),
                        Err(err) => {
                            warn!(?err, player = %player_uuid, "identity lookup failed for reward dispatch");
                            None
                        }
                    };
                    rewards
                        .on_promoted(player_uuid, discord_user_id, &promotion)
                        .await;
                });
            }
            Ok(None) => {}
            Err(err) => {
                error!(?err, player = %player_uuid, "promotion check failed");
            }
        }
    }

    pub async fn rank_summary(&self, player_uuid: Uuid) -> anyhow::Result<Option<RankSummary>> {
        let Some(rank) = self.storage.get_player_rank(player_uuid).await? else {
            return Ok(None);
        };
        let display = rank.position.display(&self.names);
        let next = match rank.position.next() {
            Some(position) => self.definitions.get_position(position).await,
            None => None,
        };
        Ok(Some(RankSummary { rank, display, next }))
    }

    /// Rebuild the definition cache from storage. Readers keep the old
    /// table until the swap.
    pub async fn reload_rank_definitions(&self) -> anyhow::Result<usize> {
        self.definitions.reload_from(self.storage.as_ref()).await
    }

    // ------------------------------------------------------------------
    // Proxy hooks
    // ------------------------------------------------------------------

    pub async fn login_decision(&self, player_uuid: Uuid, username: &str) -> LoginDecision {
        self.gate.check_login(player_uuid, username).await
    }

    pub async fn server_connect_allowed(&self, username: &str, target_server: &str) -> bool {
        self.gate.check_server_connect(username, target_server).await
    }

    /// Reclaim memory from expired/used sessions; run periodically.
    pub async fn prune_sessions(&self) -> usize {
        self.sessions.prune_expired().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::Warden;
    use crate::config::{VerificationConfig, WardenSettings};
    use crate::gate::ProxyControl;
    use crate::rank::{RankPosition, VerificationState};
    use crate::rewards::{EconomyService, Messenger, PermissionsService};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    struct NoopProxy;

    #[async_trait]
    impl ProxyControl for NoopProxy {
        async fn lift_restriction(&self, _username: &str, _player_uuid: Uuid) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct NoopEconomy {
        fail: AtomicBool,
    }

    #[async_trait]
    impl EconomyService for NoopEconomy {
        async fn give_rank_reward(&self, _player_uuid: Uuid, _amount: i64) -> bool {
            !self.fail.load(Ordering::Relaxed)
        }

        async fn give_whitelist_reward(&self, _player_uuid: Uuid) -> bool {
            !self.fail.load(Ordering::Relaxed)
        }
    }

    struct NoopPermissions;

    #[async_trait]
    impl PermissionsService for NoopPermissions {
        async fn add_player_to_group(&self, _player_uuid: Uuid, _group: &str) -> bool {
            true
        }

        async fn sync_player_rank_group(
            &self,
            _player_uuid: Uuid,
            _position: RankPosition,
        ) -> bool {
            true
        }
    }

    struct NoopMessenger;

    #[async_trait]
    impl Messenger for NoopMessenger {
        async fn send_channel_message(&self, _channel_id: u64, _content: &str) -> bool {
            true
        }

        async fn send_direct_message(&self, _user_id: u64, _content: &str) -> bool {
            true
        }

        async fn add_role_to_member(&self, _user_id: u64, _role_id: u64) -> bool {
            true
        }

        async fn remove_role_from_member(&self, _user_id: u64, _role_id: u64) -> bool {
            true
        }

        async fn member_role_ids(&self, _user_id: u64) -> Option<Vec<u64>> {
            Some(Vec::new())
        }
    }

    fn warden_with(
        settings: WardenSettings,
        storage: Arc<MemoryStorage>,
        economy: Arc<NoopEconomy>,
    ) -> Warden {
        Warden::new(
            settings,
            storage,
            Arc::new(NoopProxy),
            economy,
            Arc::new(NoopPermissions),
            Arc::new(NoopMessenger),
        )
    }

    fn warden(storage: Arc<MemoryStorage>) -> Warden {
        warden_with(
            WardenSettings::default(),
            storage,
            Arc::new(NoopEconomy::default()),
        )
    }

    #[tokio::test]
    async fn end_to_end_verification_flow() {
        let storage = Arc::new(MemoryStorage::new());
        let warden = warden(storage.clone());
        let player = Uuid::new_v4();

        let code = warden
            .request_code_for_discord("Alice", 42, "alice#0")
            .await;
        assert_eq!(code.len(), 7);

        // Submit without the separator.
        let bare: String = code.chars().filter(|c| *c != '-').collect();
        assert!(warden.submit_code("Alice", &bare, player).await.unwrap());

        // Session is gone, the player record is verified, the identity
        // linked.
        assert!(warden.sessions().live_session("Alice").await.is_none());
        let rank = storage.rank_of(player).await.unwrap();
        assert_eq!(rank.state, VerificationState::Verified);
        assert!(rank.verified_at.is_some());
        assert_eq!(rank.position, RankPosition::FIRST);

        let identity = storage.get_discord_identity(player).await.unwrap().unwrap();
        assert_eq!(identity.user_id, 42);
    }

    #[tokio::test]
    async fn wrong_code_does_not_create_a_player() {
        let storage = Arc::new(MemoryStorage::new());
        let warden = warden(storage.clone());
        let player = Uuid::new_v4();

        warden.request_code("Alice").await;
        assert!(!warden.submit_code("Alice", "000-000", player).await.unwrap());
        assert!(storage.rank_of(player).await.is_none());
        assert!(warden.sessions().live_session("Alice").await.is_some());
    }

    #[tokio::test]
    async fn reward_failure_never_blocks_verification() {
        let storage = Arc::new(MemoryStorage::new());
        let economy = Arc::new(NoopEconomy::default());
        economy.fail.store(true, Ordering::Relaxed);
        let warden = warden_with(WardenSettings::default(), storage.clone(), economy);
        let player = Uuid::new_v4();

        let code = warden.request_code("Alice").await;
        assert!(warden.submit_code("Alice", &code, player).await.unwrap());
        assert_eq!(
            storage.rank_of(player).await.unwrap().state,
            VerificationState::Verified
        );
    }

    #[tokio::test]
    async fn persistence_failure_fails_verification_closed() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_saves.store(true, Ordering::Relaxed);
        let warden = warden(storage.clone());

        let code = warden.request_code("Alice").await;
        let result = warden.submit_code("Alice", &code, Uuid::new_v4()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stalled_persistence_times_out() {
        let storage = Arc::new(MemoryStorage::new());
        storage.read_delay_ms.store(200, Ordering::Relaxed);
        let settings = WardenSettings {
            verification: VerificationConfig {
                completion_timeout_seconds: 0,
                ..VerificationConfig::default()
            },
            ..WardenSettings::default()
        };
        let warden = warden_with(settings, storage, Arc::new(NoopEconomy::default()));

        let code = warden.request_code("Alice").await;
        let result = warden.submit_code("Alice", &code, Uuid::new_v4()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn playtime_meeting_both_thresholds_promotes() {
        let storage = Arc::new(MemoryStorage::new());
        let warden = warden(storage.clone());
        let player = Uuid::new_v4();

        // Default definitions ask for 60 minutes and 2 achievements for
        // (1,2).
        let mut rank = crate::rank::PlayerRank::initial(player, 0);
        rank.achievements_completed = 2;
        storage.insert_rank(rank).await;

        assert!(warden.record_play_time(player, 60, "survival").await.unwrap());

        let rank = storage.rank_of(player).await.unwrap();
        assert_eq!(rank.position, RankPosition { main: 1, sub: 2 });
        assert_eq!(rank.play_time_minutes, 60);
    }

    #[tokio::test]
    async fn meeting_only_one_threshold_never_promotes() {
        let storage = Arc::new(MemoryStorage::new());
        let warden = warden(storage.clone());
        let player = Uuid::new_v4();

        storage
            .insert_rank(crate::rank::PlayerRank::initial(player, 0))
            .await;

        // Plenty of playtime, zero achievements.
        assert!(warden.record_play_time(player, 600, "survival").await.unwrap());
        assert_eq!(
            storage.rank_of(player).await.unwrap().position,
            RankPosition::FIRST
        );
    }

    #[tokio::test]
    async fn catalog_advancement_bumps_achievement_count() {
        let mut settings = WardenSettings::default();
        settings.catalog.insert(
            "adventure/first_night",
            crate::config::CatalogEntry {
                difficulty: crate::config::Difficulty::Easy,
                terralith: false,
                hardcore: false,
            },
        );
        let storage = Arc::new(MemoryStorage::new());
        let warden = warden_with(settings, storage.clone(), Arc::new(NoopEconomy::default()));
        let player = Uuid::new_v4();

        storage
            .insert_rank(crate::rank::PlayerRank::initial(player, 0))
            .await;

        assert!(
            warden
                .record_xp(player, "advancement", "adventure/first_night", 25, "survival", None)
                .await
                .unwrap()
        );

        let rank = storage.rank_of(player).await.unwrap();
        assert_eq!(rank.achievements_completed, 1);
        let state = storage.state.lock().await;
        assert_eq!(state.achievements.len(), 1);
        assert_eq!(state.achievements[0].1, "adventure/first_night");
    }

    #[tokio::test]
    async fn rank_summary_reports_next_requirements() {
        let storage = Arc::new(MemoryStorage::new());
        let warden = warden(storage.clone());
        let player = Uuid::new_v4();

        storage
            .insert_rank(crate::rank::PlayerRank::initial(player, 0))
            .await;

        let summary = warden.rank_summary(player).await.unwrap().unwrap();
        assert_eq!(summary.display, "novice bystander");
        let next = summary.next.unwrap();
        assert_eq!(next.position, RankPosition { main: 1, sub: 2 });

        assert!(warden.rank_summary(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reload_falls_back_to_defaults_when_storage_is_empty() {
        let storage = Arc::new(MemoryStorage::new());
        let warden = warden(storage);
        assert_eq!(warden.reload_rank_definitions().await.unwrap(), 175);
    }
}
