use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::config::{RankNames, RoleMap};
use crate::rank::{Promotion, RankPosition};

/// Economy collaborator (proxy-side). Best-effort: `false` means the credit
/// was not applied.
#[async_trait]
pub trait EconomyService: Send + Sync {
    async fn give_rank_reward(&self, player_uuid: Uuid, amount: i64) -> bool;
    async fn give_whitelist_reward(&self, player_uuid: Uuid) -> bool;
}

/// Permission-group collaborator (proxy-side). Best-effort.
#[async_trait]
pub trait PermissionsService: Send + Sync {
    async fn add_player_to_group(&self, player_uuid: Uuid, group: &str) -> bool;
    async fn sync_player_rank_group(&self, player_uuid: Uuid, position: RankPosition) -> bool;
}

/// Discord messaging collaborator. Only the reward dispatcher and
/// verification completion talk to it; the session registry and XP ledger
/// never do.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_channel_message(&self, channel_id: u64, content: &str) -> bool;
    async fn send_direct_message(&self, user_id: u64, content: &str) -> bool;
    async fn add_role_to_member(&self, user_id: u64, role_id: u64) -> bool;
    async fn remove_role_from_member(&self, user_id: u64, role_id: u64) -> bool;
    /// Roles the member currently holds, or `None` when the lookup failed.
    async fn member_role_ids(&self, user_id: u64) -> Option<Vec<u64>>;
}

/// Reacts to verification completions and promotions with external side
/// effects: economy credit, permission groups, Discord roles, messages.
///
/// Everything here is fire-and-forget from the caller's point of view. The
/// three mutation families run independently; a failure is logged and never
/// cancels the others or unwinds the state change that triggered them.
pub struct RewardDispatcher {
    economy: Arc<dyn EconomyService>,
    permissions: Arc<dyn PermissionsService>,
    messenger: Arc<dyn Messenger>,
    roles: RoleMap,
    names: RankNames,
    announce_channel: Option<u64>,
}

impl RewardDispatcher {
    pub fn new(
        economy: Arc<dyn EconomyService>,
        permissions: Arc<dyn PermissionsService>,
        messenger: Arc<dyn Messenger>,
        roles: RoleMap,
        names: RankNames,
        announce_channel: Option<u64>,
    ) -> Self {
        Self {
            economy,
            permissions,
            messenger,
            roles,
            names,
            announce_channel,
        }
    }

    /// Side effects of a completed verification.
    pub async fn on_verified(&self, player_uuid: Uuid, discord_user_id: Option<u64>) {
        let economy = async {
            if !self.economy.give_whitelist_reward(player_uuid).await {
                warn!(player = %player_uuid, "whitelist reward not applied");
            }
        };
        let permissions = async {
            if !self
                .permissions
                .add_player_to_group(player_uuid, "verified")
                .await
            {
                warn!(player = %player_uuid, "verified permission group not applied");
            }
        };
        let roles = self.reconcile_roles(player_uuid, discord_user_id, RankPosition::FIRST, true);

        tokio::join!(economy, permissions, roles);
    }

    /// Side effects of a promotion.
    pub async fn on_promoted(
        &self,
        player_uuid: Uuid,
        discord_user_id: Option<u64>,
        promotion: &Promotion,
    ) {
        let reward = &promotion.definition.reward;

        let economy = async {
            if reward.amount > 0 && !self.economy.give_rank_reward(player_uuid, reward.amount).await
            {
                warn!(player = %player_uuid, amount = reward.amount, "rank reward not applied");
            }
        };
        let permissions = async {
            if !self
                .permissions
                .sync_player_rank_group(player_uuid, promotion.to)
                .await
            {
                warn!(player = %player_uuid, "rank permission group not synced");
            }
        };
        let roles = self.reconcile_roles(player_uuid, discord_user_id, promotion.to, true);
        let messages = self.announce_promotion(discord_user_id, promotion);

        tokio::join!(economy, permissions, roles, messages);
    }

    async fn announce_promotion(&self, discord_user_id: Option<u64>, promotion: &Promotion) {
        let display = promotion.to.display(&self.names);

        if let Some(user_id) = discord_user_id {
            let content = format!("You have been promoted to **{display}**. Keep it up!");
            if !self.messenger.send_direct_message(user_id, &content).await {
                warn!(user_id, "promotion DM not delivered");
            }
        }

        if let Some(channel_id) = self.announce_channel {
            let content = format!("A player just reached **{display}**!");
            if !self.messenger.send_channel_message(channel_id, &content).await {
                warn!(channel_id, "promotion announcement not delivered");
            }
        }
    }

    /// Bring the member's managed Discord roles in line with the target set
    /// {verified role} ∪ {main-rank role} ∪ {sub-rank role}, touching only
    /// the delta and never roles outside the managed set.
    async fn reconcile_roles(
        &self,
        player_uuid: Uuid,
        discord_user_id: Option<u64>,
        position: RankPosition,
        verified: bool,
    ) {
        let Some(user_id) = discord_user_id else {
            return;
        };

        let Some(current) = self.messenger.member_role_ids(user_id).await else {
            warn!(player = %player_uuid, user_id, "member role lookup failed; skipping role sync");
            return;
        };
        let current: HashSet<u64> = current.into_iter().collect();
        let managed = self.roles.managed_roles();
        let target = self.roles.target_roles(position, verified);

        for role_id in target.difference(&current) {
            if !self.messenger.add_role_to_member(user_id, *role_id).await {
                warn!(user_id, role_id, "failed to add managed role");
            }
        }

        for role_id in current.intersection(&managed) {
            if !target.contains(role_id)
                && !self.messenger.remove_role_from_member(user_id, *role_id).await
            {
                warn!(user_id, role_id, "failed to remove stale managed role");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::{EconomyService, Messenger, PermissionsService, RewardDispatcher};
    use crate::config::{RankNames, RoleMap};
    use crate::rank::{Promotion, RankDefinition, RankPosition, RankReward};

    #[derive(Default)]
    struct RecordingEconomy {
        fail: AtomicBool,
        rank_rewards: Mutex<Vec<(Uuid, i64)>>,
        whitelist_rewards: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl EconomyService for RecordingEconomy {
        async fn give_rank_reward(&self, player_uuid: Uuid, amount: i64) -> bool {
            if self.fail.load(Ordering::Relaxed) {
                return false;
            }
            self.rank_rewards.lock().await.push((player_uuid, amount));
            true
        }

        async fn give_whitelist_reward(&self, player_uuid: Uuid) -> bool {
            if self.fail.load(Ordering::Relaxed) {
                return false;
            }
            self.whitelist_rewards.lock().await.push(player_uuid);
            true
        }
    }

    #[derive(Default)]
    struct RecordingPermissions {
        groups: Mutex<Vec<(Uuid, String)>>,
        synced: Mutex<Vec<(Uuid, RankPosition)>>,
    }

    #[async_trait]
    impl PermissionsService for RecordingPermissions {
        async fn add_player_to_group(&self, player_uuid: Uuid, group: &str) -> bool {
            self.groups.lock().await.push((player_uuid, group.to_owned()));
            true
        }

        async fn sync_player_rank_group(&self, player_uuid: Uuid, position: RankPosition) -> bool {
            self.synced.lock().await.push((player_uuid, position));
            true
        }
    }

    #[derive(Default)]
    struct RecordingMessenger {
        held_roles: Mutex<Vec<u64>>,
        added: Mutex<Vec<u64>>,
        removed: Mutex<Vec<u64>>,
        dms: Mutex<Vec<(u64, String)>>,
        channel_messages: Mutex<Vec<(u64, String)>>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_channel_message(&self, channel_id: u64, content: &str) -> bool {
            self.channel_messages
                .lock()
                .await
                .push((channel_id, content.to_owned()));
            true
        }

        async fn send_direct_message(&self, user_id: u64, content: &str) -> bool {
            self.dms.lock().await.push((user_id, content.to_owned()));
            true
        }

        async fn add_role_to_member(&self, _user_id: u64, role_id: u64) -> bool {
            self.added.lock().await.push(role_id);
            true
        }

        async fn remove_role_from_member(&self, _user_id: u64, role_id: u64) -> bool {
            self.removed.lock().await.push(role_id);
            true
        }

        async fn member_role_ids(&self, _user_id: u64) -> Option<Vec<u64>> {
            Some(self.held_roles.lock().await.clone())
        }
    }

    fn role_map() -> RoleMap {
        let mut roles = RoleMap {
            verified_role: Some(100),
            ..Default::default()
        };
        roles.main_rank_roles.insert(1, 201);
        roles.main_rank_roles.insert(2, 202);
        roles.sub_rank_roles.insert(1, 301);
        roles.sub_rank_roles.insert(2, 302);
        roles
    }

    fn promotion_to(main: u8, sub: u8, amount: i64) -> Promotion {
        let to = RankPosition { main, sub };
        Promotion {
            from: RankPosition::FIRST,
            to,
            definition: Arc::new(RankDefinition {
                position: to,
                required_time_minutes: 0,
                required_achievements: 0,
                reward: RankReward {
                    amount,
                    commands: Vec::new(),
                },
            }),
        }
    }

    fn dispatcher(
        economy: Arc<RecordingEconomy>,
        permissions: Arc<RecordingPermissions>,
        messenger: Arc<RecordingMessenger>,
    ) -> RewardDispatcher {
        RewardDispatcher::new(
            economy,
            permissions,
            messenger,
            role_map(),
            RankNames::default(),
            Some(555),
        )
    }

    #[tokio::test]
    async fn role_sync_issues_only_the_delta() {
        let economy = Arc::new(RecordingEconomy::default());
        let permissions = Arc::new(RecordingPermissions::default());
        let messenger = Arc::new(RecordingMessenger::default());
        // Holds: verified role (kept), old sub-rank role (stale), and an
        // unmanaged role that must not be touched.
        *messenger.held_roles.lock().await = vec![100, 301, 999];

        let dispatcher = dispatcher(economy, permissions, messenger.clone());
        dispatcher
            .on_promoted(Uuid::new_v4(), Some(7), &promotion_to(2, 2, 50))
            .await;

        let added: HashSet<u64> = messenger.added.lock().await.iter().copied().collect();
        let removed: HashSet<u64> = messenger.removed.lock().await.iter().copied().collect();
        assert_eq!(added, HashSet::from([202, 302]));
        assert_eq!(removed, HashSet::from([301]));
    }

    #[tokio::test]
    async fn economy_failure_does_not_cancel_role_or_group_sync() {
        let economy = Arc::new(RecordingEconomy::default());
        economy.fail.store(true, Ordering::Relaxed);
        let permissions = Arc::new(RecordingPermissions::default());
        let messenger = Arc::new(RecordingMessenger::default());

        let dispatcher = dispatcher(economy.clone(), permissions.clone(), messenger.clone());
        dispatcher
            .on_promoted(Uuid::new_v4(), Some(7), &promotion_to(1, 2, 50))
            .await;

        assert!(economy.rank_rewards.lock().await.is_empty());
        assert_eq!(permissions.synced.lock().await.len(), 1);
        assert!(!messenger.added.lock().await.is_empty());
        assert_eq!(messenger.dms.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn verification_grants_whitelist_reward_and_verified_group() {
        let economy = Arc::new(RecordingEconomy::default());
        let permissions = Arc::new(RecordingPermissions::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let player = Uuid::new_v4();

        let dispatcher = dispatcher(economy.clone(), permissions.clone(), messenger.clone());
        dispatcher.on_verified(player, Some(7)).await;

        assert_eq!(economy.whitelist_rewards.lock().await.as_slice(), &[player]);
        let groups = permissions.groups.lock().await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, "verified");

        // Starting position roles plus the verified role.
        let added: HashSet<u64> = messenger.added.lock().await.iter().copied().collect();
        assert_eq!(added, HashSet::from([100, 201, 301]));
    }

    #[tokio::test]
    async fn no_discord_identity_skips_role_sync_quietly() {
        let economy = Arc::new(RecordingEconomy::default());
        let permissions = Arc::new(RecordingPermissions::default());
        let messenger = Arc::new(RecordingMessenger::default());

        let dispatcher = dispatcher(economy, permissions, messenger.clone());
        dispatcher
            .on_promoted(Uuid::new_v4(), None, &promotion_to(1, 2, 50))
            .await;

        assert!(messenger.added.lock().await.is_empty());
        assert!(messenger.dms.lock().await.is_empty());
        // The channel announcement does not need an identity.
        assert_eq!(messenger.channel_messages.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn promotion_dm_names_the_new_rank() {
        let economy = Arc::new(RecordingEconomy::default());
        let permissions = Arc::new(RecordingPermissions::default());
        let messenger = Arc::new(RecordingMessenger::default());

        let dispatcher = dispatcher(economy, permissions, messenger.clone());
        dispatcher
            .on_promoted(Uuid::new_v4(), Some(7), &promotion_to(1, 2, 0))
            .await;

        let dms = messenger.dms.lock().await;
        assert_eq!(dms.len(), 1);
        assert!(dms[0].1.contains("apprentice bystander"));
    }
}
