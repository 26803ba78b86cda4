use anyhow::Context as _;

use warden_core::rank::{RankDefinition, RankPosition, RankReward};

/// Raw `rank_definitions` row. Reward commands are stored as a JSON array
/// in a text column.
#[derive(sqlx::FromRow)]
pub struct RankDefinitionRow {
    pub main_rank: i32,
    pub sub_rank: i32,
    pub required_time_minutes: i64,
    pub required_achievements: i64,
    pub reward_amount: i64,
    pub reward_commands: String,
}

impl RankDefinitionRow {
    pub fn into_definition(self) -> anyhow::Result<RankDefinition> {
        let commands: Vec<String> = if self.reward_commands.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.reward_commands).with_context(|| {
                format!(
                    "malformed reward_commands for rank ({}, {})",
                    self.main_rank, self.sub_rank
                )
            })?
        };

        Ok(RankDefinition {
            position: RankPosition::clamped(i64::from(self.main_rank), i64::from(self.sub_rank)),
            required_time_minutes: self.required_time_minutes,
            required_achievements: self.required_achievements,
            reward: RankReward {
                amount: self.reward_amount,
                commands,
            },
        })
    }
}
