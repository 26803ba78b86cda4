use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use uuid::Uuid;

use warden_core::xp::XpEvent;

use crate::database::Database;

/// Append an accepted XP event to the audit log.
pub async fn insert_xp_event(db: &Database, event: &XpEvent) -> anyhow::Result<()> {
    let occurred_at =
        i64::try_from(event.occurred_at).context("occurred_at out of i64 range")?;
    let metadata = event.metadata.as_ref().map(serde_json::Value::to_string);

    sqlx::query(
        "INSERT INTO xp_events (player_uuid, event_type, event_source, xp_gained,
                                occurred_at, server_name, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(event.player_uuid)
    .bind(&event.event_type)
    .bind(&event.event_source)
    .bind(event.xp_gained)
    .bind(occurred_at)
    .bind(&event.server_name)
    .bind(metadata)
    .execute(db.pool())
    .await?;

    Ok(())
}

/// Count logged events for one rate-limit key in the inclusive
/// `[from, to]` range of unix seconds. Backs the sliding windows.
pub async fn count_xp_events(
    db: &Database,
    player_uuid: Uuid,
    event_type: &str,
    event_source: &str,
    from: u64,
    to: u64,
) -> anyhow::Result<i64> {
    let from = i64::try_from(from).context("window start out of i64 range")?;
    let to = i64::try_from(to).context("window end out of i64 range")?;

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM xp_events
         WHERE player_uuid = $1 AND event_type = $2 AND event_source = $3
           AND occurred_at >= $4 AND occurred_at <= $5",
    )
    .bind(player_uuid)
    .bind(event_type)
    .bind(event_source)
    .bind(from)
    .bind(to)
    .fetch_one(db.pool())
    .await?;

    Ok(count)
}

/// Record an unlocked achievement. Re-unlocks are ignored.
pub async fn insert_achievement(
    db: &Database,
    player_uuid: Uuid,
    achievement: &str,
) -> anyhow::Result<()> {
    let unlocked_at =
        i64::try_from(now_unix_secs()).context("unlocked_at out of i64 range")?;

    sqlx::query(
        "INSERT INTO achievement_log (player_uuid, achievement, unlocked_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (player_uuid, achievement) DO NOTHING",
    )
    .bind(player_uuid)
    .bind(achievement)
    .bind(unlocked_at)
    .execute(db.pool())
    .await?;

    Ok(())
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
