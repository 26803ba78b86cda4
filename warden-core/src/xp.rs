use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::{now_unix_millis, now_unix_secs};
use crate::config::{AchievementCatalog, XpLimitsConfig, XpModifierTable};
use crate::storage::Storage;

const COOLDOWN_SHARD_COUNT: usize = 16;

// The three sliding windows; maxima come from XpLimitsConfig.
const WINDOW_MINUTE: u64 = 60;
const WINDOW_HOUR: u64 = 3_600;
const WINDOW_DAY: u64 = 86_400;

/// One accepted XP gain. Doubles as the audit record and the substrate the
/// sliding-window counters are computed from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XpEvent {
    pub player_uuid: Uuid,
    pub event_type: String,
    pub event_source: String,
    /// XP after modifiers, truncated to an integer.
    pub xp_gained: i64,
    /// Unix seconds.
    pub occurred_at: u64,
    pub server_name: String,
    pub metadata: Option<serde_json::Value>,
}

/// Composite key the cooldown stamp and window counts are tracked under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub player_uuid: Uuid,
    pub event_type: String,
    pub event_source: String,
}

/// Validates and records XP-gain events.
///
/// Farming resistance comes from two layers: a short in-memory cooldown per
/// [`RateLimitKey`], and minute/hour/day counts computed against the
/// persisted event log so they survive restarts.
pub struct XpLedger {
    limits: XpLimitsConfig,
    modifiers: XpModifierTable,
    catalog: AchievementCatalog,
    cooldowns: Vec<Mutex<HashMap<RateLimitKey, u64>>>,
}

impl XpLedger {
    pub fn new(
        limits: XpLimitsConfig,
        modifiers: XpModifierTable,
        catalog: AchievementCatalog,
    ) -> Self {
        let cooldowns = (0..COOLDOWN_SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            limits,
            modifiers,
            catalog,
            cooldowns,
        }
    }

    pub fn catalog(&self) -> &AchievementCatalog {
        &self.catalog
    }

    fn cooldown_shard(&self, key: &RateLimitKey) -> &Mutex<HashMap<RateLimitKey, u64>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.cooldowns[(hasher.finish() as usize) % self.cooldowns.len()]
    }

    /// XP after modifiers. Catalog entries (keyed by event source) win over
    /// the per-event-type table; unknown sources and types degrade to the
    /// table's 1.0 fallback. The product is truncated, not rounded.
    pub fn final_xp(&self, event_type: &str, event_source: &str, base_xp: i64) -> i64 {
        let multiplier = match self.catalog.get(event_source) {
            Some(entry) => entry.multiplier(),
            None => self.modifiers.modifier(event_type),
        };
        (base_xp as f64 * multiplier) as i64
    }

    /// Validate and record one XP gain.
    ///
    /// `Ok(false)` is the rate-limited outcome (cooldown or a full window):
    /// silent for the player, `debug!` for operators, and a strict no-op —
    /// nothing is logged and the cooldown stamp is untouched. Only a failed
    /// write of the accepted event surfaces as an error.
    #[allow(clippy::too_many_arguments)]
    pub async fn process_xp_gain(
        &self,
        storage: &dyn Storage,
        player_uuid: Uuid,
        event_type: &str,
        event_source: &str,
        base_xp: i64,
        server_name: &str,
        metadata: Option<serde_json::Value>,
    ) -> anyhow::Result<bool> {
        let key = RateLimitKey {
            player_uuid,
            event_type: event_type.to_owned(),
            event_source: event_source.to_owned(),
        };

        let now_millis = now_unix_millis();
        let cooldown_millis = self.limits.cooldown_seconds.saturating_mul(1_000);
        {
            let shard = self.cooldown_shard(&key).lock().await;
            if let Some(last) = shard.get(&key) {
                if now_millis.saturating_sub(*last) < cooldown_millis {
                    debug!(
                        player = %player_uuid,
                        event_type,
                        event_source,
                        "xp event rejected by cooldown"
                    );
                    return Ok(false);
                }
            }
        }

        let now_secs = now_unix_secs();
        if !self.within_windows(storage, &key, now_secs).await {
            return Ok(false);
        }

        let event = XpEvent {
            player_uuid,
            event_type: event_type.to_owned(),
            event_source: event_source.to_owned(),
            xp_gained: self.final_xp(event_type, event_source, base_xp),
            occurred_at: now_secs,
            server_name: server_name.to_owned(),
            metadata,
        };
        storage.log_xp_gain(&event).await?;

        // The stamp moves only once the event is accepted and durable, so a
        // rejected call never extends the cooldown.
        let mut shard = self.cooldown_shard(&key).lock().await;
        let stamp = shard.entry(key).or_insert(0);
        *stamp = (*stamp).max(now_millis);

        Ok(true)
    }

    /// Check the minute/hour/day counts against the persisted log.
    ///
    /// A storage failure here fails OPEN: the event is allowed through and
    /// the failure logged. Availability wins over strictness for gameplay
    /// traffic; the in-memory cooldown still bounds the damage.
    async fn within_windows(
        &self,
        storage: &dyn Storage,
        key: &RateLimitKey,
        now_secs: u64,
    ) -> bool {
        let windows = [
            (WINDOW_MINUTE, self.limits.max_per_minute, "minute"),
            (WINDOW_HOUR, self.limits.max_per_hour, "hour"),
            (WINDOW_DAY, self.limits.max_per_day, "day"),
        ];

        for (window_secs, max_events, label) in windows {
            let from = now_secs.saturating_sub(window_secs);
            match storage
                .get_xp_event_count(
                    key.player_uuid,
                    &key.event_type,
                    &key.event_source,
                    from,
                    now_secs,
                )
                .await
            {
                Ok(count) if count >= max_events => {
                    debug!(
                        player = %key.player_uuid,
                        event_type = %key.event_type,
                        event_source = %key.event_source,
                        window = label,
                        count,
                        "xp event rejected by sliding window"
                    );
                    return false;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        ?err,
                        player = %key.player_uuid,
                        window = label,
                        "xp window check failed; allowing event"
                    );
                }
            }
        }
        true
    }
}
