use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::now_unix_secs;
use crate::config::RankNames;
use crate::storage::Storage;

/// Number of main ranks in the progression lattice.
pub const MAIN_RANK_COUNT: u8 = 25;
/// Number of sub ranks per main rank.
pub const SUB_RANK_COUNT: u8 = 7;

/// Whether a player has completed code verification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationState {
    /// Confined to the hub until a pairing code is submitted.
    #[default]
    Purgatory,
    Verified,
}

impl VerificationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purgatory => "purgatory",
            Self::Verified => "verified",
        }
    }

    /// Unknown labels decode as purgatory; the restrictive reading is the
    /// safe one.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "verified" => Self::Verified,
            _ => Self::Purgatory,
        }
    }
}

/// One of the 175 positions of the rank lattice: `main ∈ [1,25]`,
/// `sub ∈ [1,7]`, totally ordered by `main * 7 + sub`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RankPosition {
    pub main: u8,
    pub sub: u8,
}

impl RankPosition {
    pub const FIRST: RankPosition = RankPosition { main: 1, sub: 1 };
    pub const LAST: RankPosition = RankPosition {
        main: MAIN_RANK_COUNT,
        sub: SUB_RANK_COUNT,
    };

    /// Repair out-of-range coordinates by clamping into the lattice.
    /// Loaded data is never rejected for a bad rank id.
    pub fn clamped(main: i64, sub: i64) -> Self {
        Self {
            main: main.clamp(1, i64::from(MAIN_RANK_COUNT)) as u8,
            sub: sub.clamp(1, i64::from(SUB_RANK_COUNT)) as u8,
        }
    }

    /// The next position in the total order, or `None` at the terminal
    /// (25,7).
    pub fn next(self) -> Option<RankPosition> {
        if self.sub < SUB_RANK_COUNT {
            Some(RankPosition {
                main: self.main,
                sub: self.sub + 1,
            })
        } else if self.main < MAIN_RANK_COUNT {
            Some(RankPosition {
                main: self.main + 1,
                sub: 1,
            })
        } else {
            None
        }
    }

    /// Position in the total order (`main * 7 + sub`).
    pub fn ordinal(self) -> u16 {
        u16::from(self.main) * u16::from(SUB_RANK_COUNT) + u16::from(self.sub)
    }

    /// Composite cache key (`main * 100 + sub`).
    pub fn cache_key(self) -> i32 {
        i32::from(self.main) * 100 + i32::from(self.sub)
    }

    /// Render as "<sub name> <main name>"; malformed ids degrade to the
    /// "unknown" labels instead of failing.
    pub fn display(self, names: &RankNames) -> String {
        format!("{} {}", names.sub_name(self.sub), names.main_name(self.main))
    }
}

/// A player's progression record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerRank {
    pub player_uuid: Uuid,
    pub position: RankPosition,
    /// Unix seconds of first join.
    pub join_date: u64,
    pub play_time_minutes: i64,
    pub achievements_completed: i64,
    /// Unix seconds of the most recent promotion.
    pub last_promotion: u64,
    pub verified_at: Option<u64>,
    pub state: VerificationState,
}

impl PlayerRank {
    /// Fresh record for a player entering purgatory at (1,1).
    pub fn initial(player_uuid: Uuid, now: u64) -> Self {
        Self {
            player_uuid,
            position: RankPosition::FIRST,
            join_date: now,
            play_time_minutes: 0,
            achievements_completed: 0,
            last_promotion: now,
            verified_at: None,
            state: VerificationState::Purgatory,
        }
    }
}

/// Economy credit and follow-up commands granted on reaching a rank.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RankReward {
    pub amount: i64,
    pub commands: Vec<String>,
}

/// Immutable requirements and rewards for one lattice position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankDefinition {
    pub position: RankPosition,
    pub required_time_minutes: i64,
    pub required_achievements: i64,
    pub reward: RankReward,
}

/// Built-in definition table used when storage has none: one entry per
/// lattice position with monotonically growing requirements.
pub fn default_definitions() -> Vec<RankDefinition> {
    let mut definitions = Vec::with_capacity(175);
    for main in 1..=MAIN_RANK_COUNT {
        for sub in 1..=SUB_RANK_COUNT {
            let steps = i64::from(main - 1) * i64::from(SUB_RANK_COUNT) + i64::from(sub - 1);
            definitions.push(RankDefinition {
                position: RankPosition { main, sub },
                required_time_minutes: steps * 60,
                required_achievements: steps * 2,
                reward: RankReward {
                    amount: steps * 50,
                    commands: Vec::new(),
                },
            });
        }
    }
    definitions
}

/// Read-mostly cache of rank definitions keyed by `main * 100 + sub`.
///
/// Reloads swap the whole table under a single writer; readers may observe
/// the previous table for the duration of a reload.
pub struct RankDefinitionCache {
    inner: RwLock<HashMap<i32, Arc<RankDefinition>>>,
}

impl RankDefinitionCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        let mut table = HashMap::new();
        for definition in default_definitions() {
            table.insert(definition.position.cache_key(), Arc::new(definition));
        }
        Self {
            inner: RwLock::new(table),
        }
    }

    /// Replace the whole table. Returns the new entry count.
    pub async fn replace(&self, definitions: Vec<RankDefinition>) -> usize {
        let mut table = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            table.insert(definition.position.cache_key(), Arc::new(definition));
        }
        let count = table.len();
        *self.inner.write().await = table;
        count
    }

    /// Rebuild from storage; an empty result falls back to the built-in
    /// table so progression never silently stops.
    pub async fn reload_from(&self, storage: &dyn Storage) -> anyhow::Result<usize> {
        let mut definitions = storage.get_all_rank_definitions().await?;
        if definitions.is_empty() {
            warn!("storage returned no rank definitions; using built-in defaults");
            definitions = default_definitions();
        }
        Ok(self.replace(definitions).await)
    }

    pub async fn get(&self, main_rank: u8, sub_rank: u8) -> Option<Arc<RankDefinition>> {
        let key = i32::from(main_rank) * 100 + i32::from(sub_rank);
        self.inner.read().await.get(&key).cloned()
    }

    pub async fn get_position(&self, position: RankPosition) -> Option<Arc<RankDefinition>> {
        self.inner.read().await.get(&position.cache_key()).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for RankDefinitionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A promotion decided by the engine.
#[derive(Clone, Debug)]
pub struct Promotion {
    pub from: RankPosition,
    pub to: RankPosition,
    pub definition: Arc<RankDefinition>,
}

/// Promote iff BOTH thresholds of the next position are met. Meeting only
/// one never promotes.
pub fn promotion_due(rank: &PlayerRank, next_definition: &RankDefinition) -> bool {
    rank.play_time_minutes >= next_definition.required_time_minutes
        && rank.achievements_completed >= next_definition.required_achievements
}

/// Maps accumulated playtime and achievements onto the rank lattice and
/// applies promotions.
pub struct ProgressionEngine {
    definitions: Arc<RankDefinitionCache>,
}

impl ProgressionEngine {
    pub fn new(definitions: Arc<RankDefinitionCache>) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &Arc<RankDefinitionCache> {
        &self.definitions
    }

    /// Decide, without side effects, whether the record earns the next
    /// position. Terminal (25,7) players and unknown next definitions
    /// yield `None`.
    pub async fn evaluate(&self, rank: &PlayerRank) -> Option<Promotion> {
        let next = rank.position.next()?;
        let definition = self.definitions.get_position(next).await?;

        promotion_due(rank, &definition).then(|| Promotion {
            from: rank.position,
            to: next,
            definition,
        })
    }

    /// Apply at most one promotion step for the player: load, decide,
    /// persist. Reward dispatch is the caller's concern and never rolls a
    /// persisted promotion back.
    pub async fn try_promote(
        &self,
        storage: &dyn Storage,
        player_uuid: Uuid,
    ) -> anyhow::Result<Option<Promotion>> {
        let Some(mut rank) = storage.get_player_rank(player_uuid).await? else {
            return Ok(None);
        };

        let Some(promotion) = self.evaluate(&rank).await else {
            return Ok(None);
        };

        rank.position = promotion.to;
        rank.last_promotion = now_unix_secs();
        let saved = storage.save_player_rank(&rank).await?;
        anyhow::ensure!(
            saved,
            "storage refused to persist promotion for {player_uuid}"
        );

        info!(
            player = %player_uuid,
            from = promotion.from.ordinal(),
            to = promotion.to.ordinal(),
            "player promoted"
        );
        Ok(Some(promotion))
    }
}
