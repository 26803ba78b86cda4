use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use warden_core::gate::ProxyControl;
use warden_core::rank::RankPosition;
use warden_core::rewards::{EconomyService, Messenger, PermissionsService};

/// Discord messaging collaborator backed by the serenity HTTP client.
pub struct DiscordGateway {
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
}

impl DiscordGateway {
    pub fn new(http: Arc<serenity::Http>, guild_id: u64) -> Self {
        Self {
            http,
            guild_id: serenity::GuildId::new(guild_id),
        }
    }
}

#[async_trait]
impl Messenger for DiscordGateway {
    async fn send_channel_message(&self, channel_id: u64, content: &str) -> bool {
        let channel = serenity::ChannelId::new(channel_id);
        match channel.say(self.http.as_ref(), content).await {
            Ok(_) => true,
            Err(err) => {
                warn!(?err, channel_id, "channel message failed");
                false
            }
        }
    }

    async fn send_direct_message(&self, user_id: u64, content: &str) -> bool {
        let user = serenity::UserId::new(user_id);
        let dm = match user.create_dm_channel(self.http.as_ref()).await {
            Ok(dm) => dm,
            Err(err) => {
                warn!(?err, user_id, "could not open DM channel");
                return false;
            }
        };
        match dm.id.say(self.http.as_ref(), content).await {
            Ok(_) => true,
            Err(err) => {
                warn!(?err, user_id, "direct message failed");
                false
            }
        }
    }

    async fn add_role_to_member(&self, user_id: u64, role_id: u64) -> bool {
        match self
            .http
            .add_member_role(
                self.guild_id,
                serenity::UserId::new(user_id),
                serenity::RoleId::new(role_id),
                Some("warden rank sync"),
            )
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, user_id, role_id, "role grant failed");
                false
            }
        }
    }

    async fn remove_role_from_member(&self, user_id: u64, role_id: u64) -> bool {
        match self
            .http
            .remove_member_role(
                self.guild_id,
                serenity::UserId::new(user_id),
                serenity::RoleId::new(role_id),
                Some("warden rank sync"),
            )
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, user_id, role_id, "role removal failed");
                false
            }
        }
    }

    async fn member_role_ids(&self, user_id: u64) -> Option<Vec<u64>> {
        match self
            .guild_id
            .member(self.http.as_ref(), serenity::UserId::new(user_id))
            .await
        {
            Ok(member) => Some(member.roles.iter().map(|role| role.get()).collect()),
            Err(err) => {
                warn!(?err, user_id, "member lookup failed");
                None
            }
        }
    }
}

/// Economy, permission-group, and purgatory calls to the proxy companion
/// plugin over its HTTP RPC. All best-effort.
pub struct ProxyRpc {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyRpc {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> bool {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        match self.client.post(&url).json(body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), url = %url, "proxy rpc rejected");
                false
            }
            Err(err) => {
                warn!(?err, url = %url, "proxy rpc failed");
                false
            }
        }
    }
}

#[async_trait]
impl EconomyService for ProxyRpc {
    async fn give_rank_reward(&self, player_uuid: Uuid, amount: i64) -> bool {
        self.post(
            "/v1/economy/rank-reward",
            &json!({ "player": player_uuid, "amount": amount }),
        )
        .await
    }

    async fn give_whitelist_reward(&self, player_uuid: Uuid) -> bool {
        self.post(
            "/v1/economy/whitelist-reward",
            &json!({ "player": player_uuid }),
        )
        .await
    }
}

#[async_trait]
impl PermissionsService for ProxyRpc {
    async fn add_player_to_group(&self, player_uuid: Uuid, group: &str) -> bool {
        self.post(
            "/v1/permissions/group",
            &json!({ "player": player_uuid, "group": group }),
        )
        .await
    }

    async fn sync_player_rank_group(&self, player_uuid: Uuid, position: RankPosition) -> bool {
        self.post(
            "/v1/permissions/rank-group",
            &json!({ "player": player_uuid, "main": position.main, "sub": position.sub }),
        )
        .await
    }
}

#[async_trait]
impl ProxyControl for ProxyRpc {
    async fn lift_restriction(&self, username: &str, player_uuid: Uuid) -> bool {
        self.post(
            "/v1/purgatory/lift",
            &json!({ "username": username, "player": player_uuid }),
        )
        .await
    }
}
