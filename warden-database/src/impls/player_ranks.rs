use anyhow::Context as _;
use uuid::Uuid;

use warden_core::rank::PlayerRank;

use crate::database::Database;
use crate::model::player_rank::PlayerRankRow;

pub async fn get_player_rank(
    db: &Database,
    player_uuid: Uuid,
) -> anyhow::Result<Option<PlayerRank>> {
    let row: Option<PlayerRankRow> = sqlx::query_as(
        "SELECT player_uuid, main_rank, sub_rank, join_date, play_time_minutes,
                achievements_completed, last_promotion, verified_at, verification_state
         FROM player_ranks WHERE player_uuid = $1",
    )
    .bind(player_uuid)
    .fetch_optional(db.pool())
    .await?;

    row.map(PlayerRankRow::into_rank).transpose()
}

/// Upsert a player's progression record.
pub async fn save_player_rank(db: &Database, rank: &PlayerRank) -> anyhow::Result<bool> {
    let join_date = i64::try_from(rank.join_date).context("join_date out of i64 range")?;
    let last_promotion =
        i64::try_from(rank.last_promotion).context("last_promotion out of i64 range")?;
    let verified_at = rank
        .verified_at
        .map(|at| i64::try_from(at).context("verified_at out of i64 range"))
        .transpose()?;

    let result = sqlx::query(
        "INSERT INTO player_ranks (player_uuid, main_rank, sub_rank, join_date,
                                   play_time_minutes, achievements_completed,
                                   last_promotion, verified_at, verification_state)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (player_uuid) DO UPDATE SET
             main_rank = $2,
             sub_rank = $3,
             play_time_minutes = $5,
             achievements_completed = $6,
             last_promotion = $7,
             verified_at = $8,
             verification_state = $9",
    )
    .bind(rank.player_uuid)
    .bind(i32::from(rank.position.main))
    .bind(i32::from(rank.position.sub))
    .bind(join_date)
    .bind(rank.play_time_minutes)
    .bind(rank.achievements_completed)
    .bind(last_promotion)
    .bind(verified_at)
    .bind(rank.state.as_str())
    .execute(db.pool())
    .await?;

    Ok(result.rows_affected() > 0)
}
