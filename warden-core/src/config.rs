use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::rank::RankPosition;

/// Knobs for the verification session registry.
#[derive(Clone, Debug)]
pub struct VerificationConfig {
    /// How long a pairing code stays valid, in seconds.
    pub code_ttl_seconds: u64,
    /// Maximum number of code submissions per session.
    pub max_attempts: u32,
    /// Server unverified players are confined to.
    pub default_allowed_server: String,
    /// Upper bound on the persistence phase of `complete_verification`, so
    /// a stalled storage layer cannot leave a verification pending forever.
    pub completion_timeout_seconds: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_seconds: 600,
            max_attempts: 4,
            default_allowed_server: "hub".to_owned(),
            completion_timeout_seconds: 10,
        }
    }
}

/// Knobs for the XP ingestion rate limiter.
#[derive(Clone, Copy, Debug)]
pub struct XpLimitsConfig {
    /// Minimum gap between accepted events for one (player, type, source) key.
    pub cooldown_seconds: u64,
    pub max_per_minute: i64,
    pub max_per_hour: i64,
    pub max_per_day: i64,
}

impl Default for XpLimitsConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 5,
            max_per_minute: 10,
            max_per_hour: 100,
            max_per_day: 500,
        }
    }
}

/// Per-event-type XP multipliers.
///
/// Event types not present in the table fall back to a multiplier of 1.0,
/// so new gameplay sources work without code changes.
#[derive(Clone, Debug)]
pub struct XpModifierTable {
    modifiers: HashMap<String, f64>,
}

impl Default for XpModifierTable {
    fn default() -> Self {
        let modifiers = [
            ("advancement", 1.0),
            ("playtime", 0.5),
            ("kill", 0.8),
            ("break_block", 0.3),
            ("place_block", 0.2),
            ("craft_item", 0.4),
            ("enchant_item", 1.2),
            ("trade", 0.6),
            ("fishing", 0.4),
            ("mining", 0.3),
        ]
        .into_iter()
        .map(|(event_type, modifier)| (event_type.to_owned(), modifier))
        .collect();

        Self { modifiers }
    }
}

impl XpModifierTable {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            modifiers: pairs.into_iter().collect(),
        }
    }

    /// Multiplier for an event type; unknown types pass XP through unscaled.
    pub fn modifier(&self, event_type: &str) -> f64 {
        self.modifiers.get(event_type).copied().unwrap_or(1.0)
    }
}

/// Achievement difficulty tiers and their XP multipliers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Insane,
}

impl Difficulty {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Easy => 1.0,
            Self::Medium => 1.25,
            Self::Hard => 1.5,
            Self::Insane => 2.0,
        }
    }
}

/// Extra multiplier applied to Terralith-variant achievements.
pub const TERRALITH_BONUS: f64 = 0.10;
/// Extra multiplier applied to hardcore-variant achievements.
pub const HARDCORE_BONUS: f64 = 0.50;

/// One entry of the achievement reference catalog.
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogEntry {
    pub difficulty: Difficulty,
    #[serde(default)]
    pub terralith: bool,
    #[serde(default)]
    pub hardcore: bool,
}

impl CatalogEntry {
    /// Combined XP multiplier for this catalog entry.
    pub fn multiplier(&self) -> f64 {
        let mut multiplier = self.difficulty.multiplier();
        if self.terralith {
            multiplier *= 1.0 + TERRALITH_BONUS;
        }
        if self.hardcore {
            multiplier *= 1.0 + HARDCORE_BONUS;
        }
        multiplier
    }
}

/// External reference data mapping achievement ids to XP modifiers.
///
/// Unknown ids are not an error; callers fall back to the per-event-type
/// modifier table.
#[derive(Clone, Debug, Default)]
pub struct AchievementCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl AchievementCatalog {
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let entries: HashMap<String, CatalogEntry> = serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("failed to parse achievement catalog: {e}"))?;
        Ok(Self { entries })
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: CatalogEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fixed-order display names for the 7 sub ranks.
pub const SUB_RANK_NAMES: [&str; 7] = [
    "novice",
    "apprentice",
    "adept",
    "skilled",
    "expert",
    "master",
    "immortal",
];

/// Fixed-order display names for the 25 main ranks.
pub const MAIN_RANK_NAMES: [&str; 25] = [
    "bystander",
    "wanderer",
    "settler",
    "villager",
    "townsman",
    "citizen",
    "explorer",
    "pathfinder",
    "adventurer",
    "hunter",
    "warrior",
    "knight",
    "baron",
    "viscount",
    "count",
    "margrave",
    "duke",
    "archduke",
    "prince",
    "king",
    "emperor",
    "titan",
    "celestial",
    "ascendant",
    "deity",
];

/// Display-name tables for rank positions.
#[derive(Clone, Debug)]
pub struct RankNames {
    sub: Vec<String>,
    main: Vec<String>,
}

impl Default for RankNames {
    fn default() -> Self {
        Self {
            sub: SUB_RANK_NAMES.iter().map(|s| (*s).to_owned()).collect(),
            main: MAIN_RANK_NAMES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl RankNames {
    pub fn new(sub: Vec<String>, main: Vec<String>) -> Self {
        Self { sub, main }
    }

    /// Sub-rank name, or "unknown" for ids outside the table.
    pub fn sub_name(&self, sub_rank: u8) -> &str {
        usize::from(sub_rank)
            .checked_sub(1)
            .and_then(|idx| self.sub.get(idx))
            .map_or("unknown", String::as_str)
    }

    /// Main-rank name, or "unknown rank" for ids outside the table.
    pub fn main_name(&self, main_rank: u8) -> &str {
        usize::from(main_rank)
            .checked_sub(1)
            .and_then(|idx| self.main.get(idx))
            .map_or("unknown rank", String::as_str)
    }
}

/// Discord role ids managed by the reward dispatcher.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RoleMap {
    #[serde(default)]
    pub verified_role: Option<u64>,
    #[serde(default)]
    pub main_rank_roles: HashMap<u8, u64>,
    #[serde(default)]
    pub sub_rank_roles: HashMap<u8, u64>,
}

impl RoleMap {
    /// Every role id this service considers itself the owner of.
    pub fn managed_roles(&self) -> HashSet<u64> {
        let mut managed: HashSet<u64> = self.main_rank_roles.values().copied().collect();
        managed.extend(self.sub_rank_roles.values().copied());
        managed.extend(self.verified_role);
        managed
    }

    /// Roles a member at the given position should hold.
    pub fn target_roles(&self, position: RankPosition, verified: bool) -> HashSet<u64> {
        let mut target = HashSet::new();
        if verified {
            target.extend(self.verified_role);
        }
        target.extend(self.main_rank_roles.get(&position.main).copied());
        target.extend(self.sub_rank_roles.get(&position.sub).copied());
        target
    }
}

/// Everything the assembled core needs besides its collaborators.
#[derive(Clone, Debug)]
pub struct WardenSettings {
    pub verification: VerificationConfig,
    pub xp_limits: XpLimitsConfig,
    pub modifiers: XpModifierTable,
    pub catalog: AchievementCatalog,
    pub names: RankNames,
    pub roles: RoleMap,
    /// Budget for the login-gate storage lookup; the gate denies on expiry.
    pub gate_timeout_millis: u64,
    /// Channel for public promotion announcements, if any.
    pub announce_channel: Option<u64>,
}

impl Default for WardenSettings {
    fn default() -> Self {
        Self {
            verification: VerificationConfig::default(),
            xp_limits: XpLimitsConfig::default(),
            modifiers: XpModifierTable::default(),
            catalog: AchievementCatalog::default(),
            names: RankNames::default(),
            roles: RoleMap::default(),
            gate_timeout_millis: 3_000,
            announce_channel: None,
        }
    }
}
