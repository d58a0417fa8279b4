//! Registry of authenticated users.
//!
//! Tracks every principal that passed handshake authentication, whether or
//! not it is currently inside a session, and owns the authoritative
//! socket ↔ user mapping. Entries are added when a connection authenticates
//! and removed when that same connection goes away; a stale disconnect from
//! a superseded socket never clobbers the binding of a newer one.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::connection::ConnectionId;
use crate::directory::Principal;
use crate::types::PlayerId;

#[derive(Debug, Clone)]
struct Entry {
    principal: Principal,
    socket_id: ConnectionId,
}

/// In-memory map of authenticated principals keyed by user id.
#[derive(Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<PlayerId, Entry>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a user to its current connection. A reconnect overwrites the
    /// previous binding: the latest connection wins.
    pub async fn insert(&self, user_id: PlayerId, principal: Principal, socket_id: ConnectionId) {
        self.users.write().await.insert(
            user_id,
            Entry {
                principal,
                socket_id,
            },
        );
    }

    /// The authenticated principal for a user, if connected.
    pub async fn principal(&self, user_id: PlayerId) -> Option<Principal> {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|e| e.principal.clone())
    }

    /// The socket currently bound to a user.
    pub async fn socket_of(&self, user_id: PlayerId) -> Option<ConnectionId> {
        self.users.read().await.get(&user_id).map(|e| e.socket_id)
    }

    /// Removes the user's entry, but only if it is still bound to the given
    /// socket. Returns whether an entry was removed.
    ///
    /// The socket check is what makes reconnects safe: when the superseded
    /// connection's cleanup runs after the new connection has re-bound the
    /// user, it must not erase the fresh binding.
    pub async fn remove_if_socket(&self, user_id: PlayerId, socket_id: ConnectionId) -> bool {
        let mut users = self.users.write().await;
        match users.get(&user_id) {
            Some(entry) if entry.socket_id == socket_id => {
                users.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Number of authenticated users.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}
