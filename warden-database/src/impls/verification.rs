use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use uuid::Uuid;

use warden_core::rank::VerificationState;
use warden_core::storage::DiscordIdentity;

use crate::database::Database;

#[derive(sqlx::FromRow)]
struct IdentityRow {
    discord_user_id: i64,
    discord_username: String,
}

/// Flip a player's verification state. `Ok(false)` means the player row
/// does not exist yet.
pub async fn update_verification_state(
    db: &Database,
    player_uuid: Uuid,
    state: VerificationState,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE player_ranks SET verification_state = $2 WHERE player_uuid = $1",
    )
    .bind(player_uuid)
    .bind(state.as_str())
    .execute(db.pool())
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Bind a Discord account to a player, replacing any previous link.
pub async fn link_discord_identity(
    db: &Database,
    player_uuid: Uuid,
    discord_user_id: u64,
    discord_username: &str,
) -> anyhow::Result<bool> {
    let discord_user_id_i64 =
        i64::try_from(discord_user_id).context("discord_user_id out of i64 range")?;
    let linked_at = i64::try_from(now_unix_secs()).context("linked_at out of i64 range")?;

    let result = sqlx::query(
        "INSERT INTO identity_links (player_uuid, discord_user_id, discord_username, linked_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (player_uuid) DO UPDATE SET
             discord_user_id = $2,
             discord_username = $3,
             linked_at = $4",
    )
    .bind(player_uuid)
    .bind(discord_user_id_i64)
    .bind(discord_username)
    .bind(linked_at)
    .execute(db.pool())
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_discord_identity(
    db: &Database,
    player_uuid: Uuid,
) -> anyhow::Result<Option<DiscordIdentity>> {
    let row: Option<IdentityRow> = sqlx::query_as(
        "SELECT discord_user_id, discord_username FROM identity_links WHERE player_uuid = $1",
    )
    .bind(player_uuid)
    .fetch_optional(db.pool())
    .await?;

    row.map(|row| {
        let user_id =
            u64::try_from(row.discord_user_id).context("discord_user_id out of u64 range")?;
        Ok(DiscordIdentity {
            user_id,
            username: row.discord_username,
        })
    })
    .transpose()
}

/// Reverse lookup: which player does this Discord account belong to?
pub async fn player_uuid_for_discord(
    db: &Database,
    discord_user_id: u64,
) -> anyhow::Result<Option<Uuid>> {
    let discord_user_id_i64 =
        i64::try_from(discord_user_id).context("discord_user_id out of i64 range")?;

    let uuid: Option<Uuid> = sqlx::query_scalar(
        "SELECT player_uuid FROM identity_links WHERE discord_user_id = $1
         ORDER BY linked_at DESC LIMIT 1",
    )
    .bind(discord_user_id_i64)
    .fetch_optional(db.pool())
    .await?;

    Ok(uuid)
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
