use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::rank::VerificationState;
use crate::session::SessionRegistry;
use crate::storage::Storage;

/// Shown to denied players. Deliberately generic; it never reveals whether
/// the name is unknown, unverified, or the lookup failed.
pub const DENIAL_MESSAGE: &str = "You are not whitelisted on this network.";

/// Outcome of the login hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginDecision {
    Allow,
    /// Allowed on, but confined to the named server until verified.
    Confined(String),
    Deny,
}

/// Proxy-side control the core calls back into, e.g. to release a freshly
/// verified player from purgatory. Best-effort.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    async fn lift_restriction(&self, username: &str, player_uuid: Uuid) -> bool;
}

/// Answers the proxy's connection-event questions: may this player log in,
/// and may they switch to that server.
pub struct Gate {
    storage: Arc<dyn Storage>,
    sessions: Arc<SessionRegistry>,
    lookup_timeout: Duration,
    default_server: String,
}

impl Gate {
    pub fn new(
        storage: Arc<dyn Storage>,
        sessions: Arc<SessionRegistry>,
        lookup_timeout: Duration,
        default_server: String,
    ) -> Self {
        Self {
            storage,
            sessions,
            lookup_timeout,
            default_server,
        }
    }

    /// Login hook. The proxy blocks the connection until this answers, so
    /// the storage lookup runs under a bounded timeout and the answer on
    /// timeout or storage failure is a denial.
    pub async fn check_login(&self, player_uuid: Uuid, username: &str) -> LoginDecision {
        let rank = match timeout(self.lookup_timeout, self.storage.get_player_rank(player_uuid))
            .await
        {
            Err(_) => {
                warn!(player = %player_uuid, "whitelist lookup timed out; denying login");
                return LoginDecision::Deny;
            }
            Ok(Err(err)) => {
                warn!(?err, player = %player_uuid, "whitelist lookup failed; denying login");
                return LoginDecision::Deny;
            }
            Ok(Ok(rank)) => rank,
        };

        match rank {
            Some(rank) if rank.state == VerificationState::Verified => LoginDecision::Allow,
            Some(_) => LoginDecision::Confined(self.confinement_server(username).await),
            // Unknown players get in only if a pairing session is waiting
            // for them, and then only into purgatory.
            None => match self.sessions.allowed_server(username).await {
                Some(server) => LoginDecision::Confined(server),
                None => LoginDecision::Deny,
            },
        }
    }

    /// Server-switch hook: a live verification session confines the player
    /// to its designated server.
    pub async fn check_server_connect(&self, username: &str, target_server: &str) -> bool {
        match self.sessions.allowed_server(username).await {
            Some(allowed) => allowed.eq_ignore_ascii_case(target_server),
            None => true,
        }
    }

    async fn confinement_server(&self, username: &str) -> String {
        self.sessions
            .allowed_server(username)
            .await
            .unwrap_or_else(|| self.default_server.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use uuid::Uuid;

    use super::{Gate, LoginDecision};
    use crate::config::VerificationConfig;
    use crate::rank::{PlayerRank, VerificationState};
    use crate::session::SessionRegistry;
    use crate::storage::memory::MemoryStorage;

    fn gate(storage: Arc<MemoryStorage>, sessions: Arc<SessionRegistry>) -> Gate {
        Gate::new(storage, sessions, Duration::from_millis(200), "hub".to_owned())
    }

    fn sessions() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(VerificationConfig::default()))
    }

    #[tokio::test]
    async fn verified_players_are_allowed() {
        let storage = Arc::new(MemoryStorage::new());
        let player = Uuid::new_v4();
        let mut rank = PlayerRank::initial(player, 0);
        rank.state = VerificationState::Verified;
        rank.verified_at = Some(0);
        storage.insert_rank(rank).await;

        let gate = gate(storage, sessions());
        assert_eq!(gate.check_login(player, "Alice").await, LoginDecision::Allow);
    }

    #[tokio::test]
    async fn purgatory_players_are_confined_to_hub() {
        let storage = Arc::new(MemoryStorage::new());
        let player = Uuid::new_v4();
        storage.insert_rank(PlayerRank::initial(player, 0)).await;

        let gate = gate(storage, sessions());
        assert_eq!(
            gate.check_login(player, "Alice").await,
            LoginDecision::Confined("hub".to_owned())
        );
    }

    #[tokio::test]
    async fn unknown_player_with_pending_session_enters_purgatory() {
        let storage = Arc::new(MemoryStorage::new());
        let sessions = sessions();
        sessions.create_session("Alice").await;

        let gate = gate(storage, sessions);
        assert_eq!(
            gate.check_login(Uuid::new_v4(), "Alice").await,
            LoginDecision::Confined("hub".to_owned())
        );
    }

    #[tokio::test]
    async fn unknown_player_without_session_is_denied() {
        let gate = gate(Arc::new(MemoryStorage::new()), sessions());
        assert_eq!(
            gate.check_login(Uuid::new_v4(), "Alice").await,
            LoginDecision::Deny
        );
    }

    #[tokio::test]
    async fn slow_storage_denies_instead_of_blocking_login() {
        let storage = Arc::new(MemoryStorage::new());
        storage.read_delay_ms.store(500, Ordering::Relaxed);
        let player = Uuid::new_v4();
        storage.insert_rank(PlayerRank::initial(player, 0)).await;

        let gate = Gate::new(
            storage,
            sessions(),
            Duration::from_millis(20),
            "hub".to_owned(),
        );
        assert_eq!(gate.check_login(player, "Alice").await, LoginDecision::Deny);
    }

    #[tokio::test]
    async fn live_session_confines_server_switches() {
        let sessions = sessions();
        sessions.create_session("Alice").await;

        let gate = gate(Arc::new(MemoryStorage::new()), sessions);
        assert!(gate.check_server_connect("Alice", "hub").await);
        assert!(gate.check_server_connect("Alice", "HUB").await);
        assert!(!gate.check_server_connect("Alice", "survival").await);
        // No session, no confinement.
        assert!(gate.check_server_connect("Bob", "survival").await);
    }
}
