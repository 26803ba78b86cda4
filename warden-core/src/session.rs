use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::now_unix_secs;
use crate::config::VerificationConfig;

/// Number of independent lock shards in the registry. Sessions for different
/// usernames hash to different shards, so unrelated players never contend on
/// one lock.
const SHARD_COUNT: usize = 16;

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEF";

/// A pending username ↔ Discord pairing.
///
/// At most one live (unexpired, unused) session exists per username.
#[derive(Clone, Debug)]
pub struct VerificationSession {
    /// Pairing code in `XXX-XXX` form.
    pub code: String,
    /// Absolute expiry, unix seconds.
    pub expires_at: u64,
    pub discord_user_id: Option<u64>,
    pub discord_username: Option<String>,
    /// Server the player is confined to until verified.
    pub allowed_server: String,
    pub attempts: u32,
    pub used: bool,
}

impl VerificationSession {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Live means the session can still complete: unexpired and unused.
    pub fn is_live_at(&self, now: u64) -> bool {
        !self.used && !self.is_expired_at(now)
    }

    /// Seconds of validity left at `now`.
    pub fn remaining_secs_at(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

/// Generate a pairing code: three random hex nybbles, a separator, three
/// more. Short-lived and single-use; the attempt cap does the guarding.
fn generate_code<R: Rng>(rng: &mut R) -> String {
    let mut code = String::with_capacity(7);
    for idx in 0..6 {
        if idx == 3 {
            code.push('-');
        }
        code.push(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char);
    }
    code
}

/// Strip the separator and uppercase, so `a1b-2c3`, `A1B2C3` and `A1B-2C3`
/// all compare equal.
fn normalize_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn codes_match(stored: &str, submitted: &str) -> bool {
    normalize_code(stored) == normalize_code(submitted)
}

fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Registry of in-flight verification sessions, keyed by normalized
/// username. Check-then-act sequences on one username run under that
/// username's shard lock. Expiry is evaluated lazily on access;
/// [`SessionRegistry::prune_expired`] exists only to reclaim memory.
pub struct SessionRegistry {
    shards: Vec<Mutex<HashMap<String, VerificationSession>>>,
    config: VerificationConfig,
}

impl SessionRegistry {
    pub fn new(config: VerificationConfig) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { shards, config }
    }

    fn shard_for(&self, key: &str) -> &Mutex<HashMap<String, VerificationSession>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn fresh_session(&self, now: u64) -> VerificationSession {
        VerificationSession {
            code: generate_code(&mut rand::thread_rng()),
            expires_at: now + self.config.code_ttl_seconds,
            discord_user_id: None,
            discord_username: None,
            allowed_server: self.config.default_allowed_server.clone(),
            attempts: 0,
            used: false,
        }
    }

    /// Issue a pairing code for a username. Idempotent: while a live session
    /// exists its code is returned unchanged; otherwise a fresh session
    /// replaces whatever expired or used entry was left behind.
    pub async fn create_session(&self, username: &str) -> String {
        self.create_session_inner(username, None, None, now_unix_secs())
            .await
    }

    /// Same as [`Self::create_session`], seeding the Discord identity link
    /// at creation time.
    pub async fn create_session_with_identity(
        &self,
        username: &str,
        discord_user_id: u64,
        discord_username: &str,
    ) -> String {
        self.create_session_inner(
            username,
            Some(discord_user_id),
            Some(discord_username),
            now_unix_secs(),
        )
        .await
    }

    async fn create_session_inner(
        &self,
        username: &str,
        discord_user_id: Option<u64>,
        discord_username: Option<&str>,
        now: u64,
    ) -> String {
        let key = normalize_username(username);
        let mut shard = self.shard_for(&key).lock().await;

        let session = shard.entry(key).or_insert_with(|| self.fresh_session(now));

        // Dead entries (expired or already used) are replaced rather than
        // revived; live ones keep their code.
        if !session.is_live_at(now) {
            *session = self.fresh_session(now);
        }

        if session.discord_user_id.is_none() {
            session.discord_user_id = discord_user_id;
            session.discord_username = discord_username.map(str::to_owned);
        }

        session.code.clone()
    }

    /// Check a submitted code against the username's session.
    ///
    /// Checks run in order: existence, expiry, used, attempt cap, code
    /// match. The attempt counter advances exactly once per call that
    /// reaches the cap check, so after `max_attempts` submissions every
    /// further one fails no matter what was typed. All outcomes are plain
    /// booleans; nothing here is an error.
    pub async fn validate_code(&self, username: &str, code: &str) -> bool {
        self.validate_code_at(username, code, now_unix_secs()).await
    }

    async fn validate_code_at(&self, username: &str, code: &str, now: u64) -> bool {
        let key = normalize_username(username);
        let mut shard = self.shard_for(&key).lock().await;

        let Some(session) = shard.get_mut(&key) else {
            return false;
        };
        if session.is_expired_at(now) {
            debug!(username = %key, "code submitted against expired session");
            return false;
        }
        if session.used {
            return false;
        }
        if session.attempts >= self.config.max_attempts {
            debug!(username = %key, "code submitted after attempt cap");
            return false;
        }
        session.attempts += 1;

        codes_match(&session.code, code)
    }

    /// Atomically flag the username's live session as used and return a
    /// snapshot of it. Returns `None` when there is nothing live to
    /// complete.
    pub async fn mark_used(&self, username: &str) -> Option<VerificationSession> {
        let key = normalize_username(username);
        let mut shard = self.shard_for(&key).lock().await;
        let now = now_unix_secs();

        let session = shard.get_mut(&key)?;
        if !session.is_live_at(now) {
            return None;
        }
        session.used = true;
        Some(session.clone())
    }

    /// Attach a Discord identity to an existing live session.
    pub async fn bind_identity(
        &self,
        username: &str,
        discord_user_id: u64,
        discord_username: &str,
    ) -> bool {
        let key = normalize_username(username);
        let mut shard = self.shard_for(&key).lock().await;
        let now = now_unix_secs();

        match shard.get_mut(&key) {
            Some(session) if session.is_live_at(now) => {
                session.discord_user_id = Some(discord_user_id);
                session.discord_username = Some(discord_username.to_owned());
                true
            }
            _ => false,
        }
    }

    pub async fn remove_session(&self, username: &str) -> bool {
        let key = normalize_username(username);
        let mut shard = self.shard_for(&key).lock().await;
        shard.remove(&key).is_some()
    }

    /// Snapshot of the username's live session, if any.
    pub async fn live_session(&self, username: &str) -> Option<VerificationSession> {
        let key = normalize_username(username);
        let shard = self.shard_for(&key).lock().await;
        let now = now_unix_secs();

        shard
            .get(&key)
            .filter(|session| session.is_live_at(now))
            .cloned()
    }

    /// Linear scan for a live session holding this code, for
    /// Discord-initiated discovery. Returns the normalized username with a
    /// snapshot of the session.
    pub async fn find_by_code(&self, code: &str) -> Option<(String, VerificationSession)> {
        let wanted = normalize_code(code);
        let now = now_unix_secs();

        for shard in &self.shards {
            let shard = shard.lock().await;
            for (username, session) in shard.iter() {
                if session.is_live_at(now) && normalize_code(&session.code) == wanted {
                    return Some((username.clone(), session.clone()));
                }
            }
        }
        None
    }

    /// Server a username is confined to while its session is live.
    pub async fn allowed_server(&self, username: &str) -> Option<String> {
        self.live_session(username)
            .await
            .map(|session| session.allowed_server)
    }

    /// Drop expired and used sessions. Correctness never depends on this
    /// running; it only reclaims memory.
    pub async fn prune_expired(&self) -> usize {
        let now = now_unix_secs();
        let mut removed = 0;

        for shard in &self.shards {
            let mut shard = shard.lock().await;
            let before = shard.len();
            shard.retain(|_, session| session.is_live_at(now));
            removed += before - shard.len();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionRegistry, codes_match, generate_code, normalize_code};
    use crate::config::VerificationConfig;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(VerificationConfig::default())
    }

    #[test]
    fn generated_codes_are_formatted_hex() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 7);
            assert_eq!(code.as_bytes()[3], b'-');
            assert!(
                code.chars()
                    .filter(|c| *c != '-')
                    .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())
            );
        }
    }

    #[test]
    fn code_comparison_ignores_separator_in_both_directions() {
        assert!(codes_match("A1B-2C3", "A1B2C3"));
        assert!(codes_match("A1B2C3", "A1B-2C3"));
        assert!(codes_match("A1B-2C3", "a1b-2c3"));
        assert!(!codes_match("A1B-2C3", "A1B-2C4"));
        assert_eq!(normalize_code("  a1b-2c3 "), "A1B2C3");
    }

    #[tokio::test]
    async fn create_session_is_idempotent_while_live() {
        let registry = registry();
        let first = registry.create_session("Alice").await;
        let second = registry.create_session("alice").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn identity_is_seeded_on_existing_session() {
        let registry = registry();
        let code = registry.create_session("Alice").await;
        let same = registry
            .create_session_with_identity("Alice", 42, "alice#0")
            .await;
        assert_eq!(code, same);

        let session = registry.live_session("alice").await.unwrap();
        assert_eq!(session.discord_user_id, Some(42));
        assert_eq!(session.discord_username.as_deref(), Some("alice#0"));
    }

    #[tokio::test]
    async fn validation_accepts_code_without_separator() {
        let registry = registry();
        let code = registry.create_session("Alice").await;
        let bare: String = code.chars().filter(|c| *c != '-').collect();
        assert!(registry.validate_code("Alice", &bare).await);
    }

    #[tokio::test]
    async fn fifth_attempt_fails_even_with_correct_code() {
        let registry = registry();
        let code = registry.create_session("Alice").await;

        for _ in 0..4 {
            assert!(!registry.validate_code("Alice", "000-000").await);
        }
        // Attempt cap reached; the right code no longer helps.
        assert!(!registry.validate_code("Alice", &code).await);
    }

    #[tokio::test]
    async fn fourth_attempt_can_still_succeed() {
        let registry = registry();
        let code = registry.create_session("Alice").await;

        for _ in 0..3 {
            assert!(!registry.validate_code("Alice", "000-000").await);
        }
        assert!(registry.validate_code("Alice", &code).await);
    }

    #[tokio::test]
    async fn unknown_username_never_validates() {
        let registry = registry();
        assert!(!registry.validate_code("Nobody", "A1B-2C3").await);
    }

    #[tokio::test]
    async fn used_sessions_reject_and_get_replaced() {
        let registry = registry();
        let code = registry.create_session("Alice").await;
        assert!(registry.mark_used("Alice").await.is_some());

        assert!(!registry.validate_code("Alice", &code).await);
        assert!(registry.live_session("Alice").await.is_none());

        // A new request replaces the used entry with a fresh session.
        let fresh = registry.create_session("Alice").await;
        assert!(registry.live_session("Alice").await.is_some());
        assert!(registry.validate_code("Alice", &fresh).await);
    }

    #[tokio::test]
    async fn expired_sessions_reject_and_get_replaced() {
        let registry = SessionRegistry::new(VerificationConfig {
            code_ttl_seconds: 0,
            ..VerificationConfig::default()
        });
        let code = registry.create_session("Alice").await;
        assert!(!registry.validate_code("Alice", &code).await);
        assert!(registry.mark_used("Alice").await.is_none());
    }

    #[tokio::test]
    async fn find_by_code_scans_live_sessions() {
        let registry = registry();
        let code = registry.create_session("Alice").await;
        registry.create_session("Bob").await;

        let bare: String = code.chars().filter(|c| *c != '-').collect();
        let (username, session) = registry.find_by_code(&bare).await.unwrap();
        assert_eq!(username, "alice");
        assert_eq!(session.code, code);

        assert!(registry.find_by_code("ZZZ-ZZZ").await.is_none());
    }

    #[tokio::test]
    async fn identity_can_be_bound_after_discovery() {
        let registry = registry();
        let code = registry.create_session("Alice").await;

        let (username, _) = registry.find_by_code(&code).await.unwrap();
        assert!(registry.bind_identity(&username, 42, "alice#0").await);

        let session = registry.live_session("Alice").await.unwrap();
        assert_eq!(session.discord_user_id, Some(42));

        // Nothing to bind to once the session is gone.
        registry.remove_session("Alice").await;
        assert!(!registry.bind_identity("Alice", 42, "alice#0").await);
    }

    #[tokio::test]
    async fn allowed_server_follows_live_session() {
        let registry = registry();
        registry.create_session("Alice").await;
        assert_eq!(registry.allowed_server("Alice").await.as_deref(), Some("hub"));
        registry.remove_session("Alice").await;
        assert_eq!(registry.allowed_server("Alice").await, None);
    }

    #[tokio::test]
    async fn prune_drops_only_dead_sessions() {
        let registry = registry();
        registry.create_session("Alice").await;
        registry.create_session("Bob").await;
        registry.mark_used("Bob").await;

        assert_eq!(registry.prune_expired().await, 1);
        assert!(registry.live_session("Alice").await.is_some());
    }
}
