use warden_core::rank::RankDefinition;

use crate::database::Database;
use crate::model::rank_definition::RankDefinitionRow;

/// Fetch the whole definition table in lattice order. The core caches the
/// result wholesale; this is only hit on startup and explicit reloads.
pub async fn get_all_rank_definitions(db: &Database) -> anyhow::Result<Vec<RankDefinition>> {
    let rows: Vec<RankDefinitionRow> = sqlx::query_as(
        "SELECT main_rank, sub_rank, required_time_minutes, required_achievements,
                reward_amount, reward_commands
         FROM rank_definitions
         ORDER BY main_rank ASC, sub_rank ASC",
    )
    .fetch_all(db.pool())
    .await?;

    let mut definitions = Vec::with_capacity(rows.len());
    for row in rows {
        definitions.push(row.into_definition()?);
    }
    Ok(definitions)
}
