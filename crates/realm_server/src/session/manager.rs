//! Registry of live sessions.
//!
//! The [`SessionManager`] owns every [`Session`], keyed by realm id, plus
//! the reverse indexes `user id → realm id` and `socket id → user id`. It
//! enforces the lifecycle rules: a session is created by the first join of
//! a realm, destroyed when its last player leaves, and a user belongs to at
//! most one session at a time.
//!
//! Lock order is always manager registry first, then the session mutex.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::connection::ConnectionId;
use crate::session::{AddOutcome, RealmSnapshot, RemoveOutcome, Session};
use crate::types::{PlayerId, RealmId};

/// Result of removing a player through the manager.
#[derive(Debug)]
pub struct DepartureOutcome {
    pub user_id: PlayerId,
    pub realm_id: RealmId,
    /// The session-level removal outcome (room sockets, proximity shifts).
    pub removal: RemoveOutcome,
    /// Whether the session was destroyed because it became empty.
    pub session_destroyed: bool,
}

/// Result of evicting a whole realm.
#[derive(Debug)]
pub struct EvictionOutcome {
    pub realm_id: RealmId,
    /// Every player that was in the session, with its socket.
    pub players: Vec<(PlayerId, ConnectionId)>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<RealmId, Arc<Session>>,
    by_user: HashMap<PlayerId, RealmId>,
    by_socket: HashMap<ConnectionId, PlayerId>,
}

/// Registry of live sessions with reverse lookup by user and socket.
#[derive(Default)]
pub struct SessionManager {
    registry: RwLock<Registry>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session hosting `realm_id`, creating it from the given
    /// snapshot if none exists. Idempotent: an existing session keeps the
    /// snapshot it was created with.
    pub async fn get_or_create(&self, snapshot: RealmSnapshot) -> Arc<Session> {
        let mut registry = self.registry.write().await;
        registry
            .sessions
            .entry(snapshot.id)
            .or_insert_with(|| {
                info!("🏠 Session created for realm {}", snapshot.id);
                Arc::new(Session::new(snapshot))
            })
            .clone()
    }

    /// The session the user is currently in, if any.
    pub async fn session_of(&self, user_id: PlayerId) -> Option<Arc<Session>> {
        let registry = self.registry.read().await;
        let realm_id = registry.by_user.get(&user_id)?;
        registry.sessions.get(realm_id).cloned()
    }

    /// The session hosting the given realm, if any.
    pub async fn session(&self, realm_id: RealmId) -> Option<Arc<Session>> {
        self.registry.read().await.sessions.get(&realm_id).cloned()
    }

    /// Joins a user into the realm's session, creating the session when the
    /// realm is not currently hosted, and records the reverse indexes.
    ///
    /// The caller must have removed any previous presence of the user (the
    /// duplicate-login kick) before calling this.
    pub async fn join(
        &self,
        snapshot: RealmSnapshot,
        socket_id: ConnectionId,
        user_id: PlayerId,
        username: String,
        skin: String,
    ) -> (Arc<Session>, AddOutcome) {
        let mut registry = self.registry.write().await;
        let realm_id = snapshot.id;
        let session = registry
            .sessions
            .entry(realm_id)
            .or_insert_with(|| {
                info!("🏠 Session created for realm {realm_id}");
                Arc::new(Session::new(snapshot))
            })
            .clone();

        let outcome = session
            .add_player(socket_id, user_id, username, skin)
            .await;
        registry.by_user.insert(user_id, realm_id);
        registry.by_socket.insert(socket_id, user_id);
        debug!("👥 Player {user_id} joined realm {realm_id} on socket {socket_id}");

        (session, outcome)
    }

    /// Removes whichever player owns the given socket.
    ///
    /// Returns `None` when the socket maps to no player (already removed by
    /// a kick, or never joined). Destroys the session if it became empty.
    pub async fn log_out_by_socket(&self, socket_id: ConnectionId) -> Option<DepartureOutcome> {
        let mut registry = self.registry.write().await;
        let user_id = *registry.by_socket.get(&socket_id)?;
        self.remove_locked(&mut registry, user_id).await
    }

    /// Forcibly removes a player from its session.
    ///
    /// The caller is responsible for delivering the terminal message to the
    /// returned socket and closing it.
    pub async fn kick_player(&self, user_id: PlayerId) -> Option<DepartureOutcome> {
        let mut registry = self.registry.write().await;
        self.remove_locked(&mut registry, user_id).await
    }

    /// Tears down the session hosting `realm_id`, returning every member so
    /// the caller can send terminal frames and close their sockets. Used
    /// when the persisted realm record changes or disappears.
    pub async fn evict_realm(&self, realm_id: RealmId) -> Option<EvictionOutcome> {
        let mut registry = self.registry.write().await;
        let session = registry.sessions.remove(&realm_id)?;

        let players: Vec<(PlayerId, ConnectionId)> = session
            .players()
            .await
            .into_iter()
            .map(|p| (p.user_id, p.socket_id))
            .collect();
        for (user_id, socket_id) in &players {
            registry.by_user.remove(user_id);
            registry.by_socket.remove(socket_id);
        }
        info!(
            "🧹 Evicted realm {realm_id} ({} player(s))",
            players.len()
        );

        Some(EvictionOutcome { realm_id, players })
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    /// Number of players across all sessions.
    pub async fn player_count(&self) -> usize {
        self.registry.read().await.by_user.len()
    }

    async fn remove_locked(
        &self,
        registry: &mut Registry,
        user_id: PlayerId,
    ) -> Option<DepartureOutcome> {
        let realm_id = *registry.by_user.get(&user_id)?;
        let session = registry.sessions.get(&realm_id)?.clone();
        let removal = session.remove_player(user_id).await.ok()?;

        registry.by_user.remove(&user_id);
        registry.by_socket.remove(&removal.player.socket_id);

        let session_destroyed = session.player_count().await == 0;
        if session_destroyed {
            registry.sessions.remove(&realm_id);
            info!("🏚️ Session for realm {realm_id} destroyed (last player left)");
        }

        Some(DepartureOutcome {
            user_id,
            realm_id,
            removal,
            session_destroyed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::RealmRecord;
    use serde_json::json;
    use uuid::Uuid;

    fn pid(n: u128) -> PlayerId {
        PlayerId(Uuid::from_u128(n))
    }

    fn snapshot(realm: u128) -> RealmSnapshot {
        let record = RealmRecord {
            id: RealmId(Uuid::from_u128(realm)),
            owner_id: pid(1000),
            share_id: None,
            map_data: json!({"rooms": [{"spawn": {"x": 0.0, "y": 0.0}}]}),
        };
        RealmSnapshot::from_record(&record).unwrap()
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let manager = SessionManager::new();
        let first = manager.get_or_create(snapshot(1)).await;
        let second = manager.get_or_create(snapshot(1)).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn join_records_reverse_indexes() {
        let manager = SessionManager::new();
        let (session, _) = manager
            .join(snapshot(1), 7, pid(1), "ada".into(), "robot".into())
            .await;

        let found = manager.session_of(pid(1)).await.unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert!(session.contains(pid(1)).await);
        assert_eq!(manager.player_count().await, 1);
    }

    #[tokio::test]
    async fn last_leave_destroys_the_session() {
        let manager = SessionManager::new();
        manager
            .join(snapshot(1), 7, pid(1), "ada".into(), "robot".into())
            .await;
        manager
            .join(snapshot(1), 8, pid(2), "ben".into(), "cat".into())
            .await;

        let departure = manager.log_out_by_socket(7).await.unwrap();
        assert_eq!(departure.user_id, pid(1));
        assert!(!departure.session_destroyed);
        assert_eq!(manager.session_count().await, 1);

        let departure = manager.log_out_by_socket(8).await.unwrap();
        assert!(departure.session_destroyed);
        assert_eq!(manager.session_count().await, 0);
        assert!(manager.session_of(pid(2)).await.is_none());
    }

    #[tokio::test]
    async fn log_out_unknown_socket_is_a_no_op() {
        let manager = SessionManager::new();
        assert!(manager.log_out_by_socket(99).await.is_none());
    }

    #[tokio::test]
    async fn kick_removes_by_user_id() {
        let manager = SessionManager::new();
        manager
            .join(snapshot(1), 7, pid(1), "ada".into(), "robot".into())
            .await;

        let departure = manager.kick_player(pid(1)).await.unwrap();
        assert_eq!(departure.removal.player.socket_id, 7);
        assert!(departure.session_destroyed);
        // The socket mapping is gone too.
        assert!(manager.log_out_by_socket(7).await.is_none());
    }

    #[tokio::test]
    async fn evict_realm_returns_all_members() {
        let manager = SessionManager::new();
        manager
            .join(snapshot(1), 7, pid(1), "ada".into(), "robot".into())
            .await;
        manager
            .join(snapshot(1), 8, pid(2), "ben".into(), "cat".into())
            .await;

        let eviction = manager.evict_realm(RealmId(Uuid::from_u128(1))).await.unwrap();
        assert_eq!(eviction.players.len(), 2);
        assert_eq!(manager.session_count().await, 0);
        assert_eq!(manager.player_count().await, 0);
    }

    #[tokio::test]
    async fn a_user_is_in_at_most_one_session() {
        let manager = SessionManager::new();
        manager
            .join(snapshot(1), 7, pid(1), "ada".into(), "robot".into())
            .await;
        // Kick before rejoining elsewhere, as the join protocol does.
        manager.kick_player(pid(1)).await.unwrap();
        manager
            .join(snapshot(2), 8, pid(1), "ada".into(), "robot".into())
            .await;

        let session = manager.session_of(pid(1)).await.unwrap();
        assert_eq!(session.realm().id, RealmId(Uuid::from_u128(2)));
        assert_eq!(manager.session_count().await, 1);
    }
}
