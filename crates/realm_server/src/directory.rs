//! External collaborator interfaces.
//!
//! The core never talks to the identity provider or the realm store
//! directly; it goes through the [`TokenVerifier`] and [`RealmStore`]
//! traits. The server process wires in real implementations; tests and
//! development use the in-memory ones provided here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{PlayerId, RealmId};

/// An authenticated identity, as vouched for by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Display name derived from the identity record.
    pub username: String,
}

/// Persistent record of a realm as held by the external store.
#[derive(Debug, Clone)]
pub struct RealmRecord {
    pub id: RealmId,
    pub owner_id: PlayerId,
    /// Secondary UUID gating non-owner access; `None` means public.
    pub share_id: Option<Uuid>,
    /// Opaque structured map blob, parsed by the core at session creation.
    pub map_data: serde_json::Value,
}

/// Persistent per-user profile record.
#[derive(Debug, Clone)]
pub struct Profile {
    pub skin: String,
}

/// Identity provider capability: exchanges a bearer token and a claimed
/// user id for an authenticated principal.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies that `token` belongs to `claimed_uid`. Returns the
    /// principal on success, `None` on any mismatch or invalid token.
    async fn verify(&self, token: &str, claimed_uid: PlayerId) -> Option<Principal>;
}

/// Realm store capability: read-only access to realms and profiles.
#[async_trait]
pub trait RealmStore: Send + Sync {
    async fn load_realm(&self, realm_id: RealmId) -> Option<RealmRecord>;
    async fn load_profile(&self, user_id: PlayerId) -> Option<Profile>;
}

/// In-memory identity provider for tests and development.
///
/// Accepts a token iff it was registered for exactly that user id.
#[derive(Default)]
pub struct MemoryIdentity {
    tokens: RwLock<HashMap<String, (PlayerId, Principal)>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a user.
    pub async fn add_token(&self, token: &str, user_id: PlayerId, username: &str) {
        self.tokens.write().await.insert(
            token.to_string(),
            (
                user_id,
                Principal {
                    username: username.to_string(),
                },
            ),
        );
    }
}

#[async_trait]
impl TokenVerifier for MemoryIdentity {
    async fn verify(&self, token: &str, claimed_uid: PlayerId) -> Option<Principal> {
        let tokens = self.tokens.read().await;
        match tokens.get(token) {
            Some((user_id, principal)) if *user_id == claimed_uid => Some(principal.clone()),
            _ => None,
        }
    }
}

/// In-memory realm and profile store for tests and development.
#[derive(Default)]
pub struct MemoryStore {
    realms: RwLock<HashMap<RealmId, RealmRecord>>,
    profiles: RwLock<HashMap<PlayerId, Profile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_realm(&self, record: RealmRecord) {
        self.realms.write().await.insert(record.id, record);
    }

    pub async fn remove_realm(&self, realm_id: RealmId) {
        self.realms.write().await.remove(&realm_id);
    }

    pub async fn put_profile(&self, user_id: PlayerId, skin: &str) {
        self.profiles.write().await.insert(
            user_id,
            Profile {
                skin: skin.to_string(),
            },
        );
    }
}

#[async_trait]
impl RealmStore for MemoryStore {
    async fn load_realm(&self, realm_id: RealmId) -> Option<RealmRecord> {
        self.realms.read().await.get(&realm_id).cloned()
    }

    async fn load_profile(&self, user_id: PlayerId) -> Option<Profile> {
        self.profiles.read().await.get(&user_id).cloned()
    }
}

/// Convenience bundle of the two collaborator handles.
#[derive(Clone)]
pub struct Directory {
    pub identity: Arc<dyn TokenVerifier>,
    pub store: Arc<dyn RealmStore>,
}
