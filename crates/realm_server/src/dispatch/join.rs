//! The join protocol.
//!
//! Joining is the most intricate dispatcher path: it is the only one that
//! touches the external store, the only one allowed to answer a validation
//! failure, and the one that enforces the at-most-one-connection-per-user
//! invariant by kicking a previous login before admitting the new one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{send_shifts, ServerContext};
use crate::connection::ConnectionId;
use crate::protocol::{ServerEvent, WirePlayer, WireRealm};
use crate::session::RealmSnapshot;
use crate::types::{PlayerId, RealmId};

/// Guard set for joins in progress, one entry per user id.
///
/// `try_acquire` returns a permit that removes the entry when dropped, so
/// the marker is cleared on every exit path, including panics.
#[derive(Clone, Default)]
pub struct JoinGate {
    in_progress: Arc<Mutex<HashSet<PlayerId>>>,
}

impl JoinGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a join as in progress for the user. Returns `None` when one
    /// already is.
    pub fn try_acquire(&self, user_id: PlayerId) -> Option<JoinPermit> {
        let mut set = self.in_progress.lock().expect("join gate poisoned");
        if set.insert(user_id) {
            Some(JoinPermit {
                gate: self.in_progress.clone(),
                user_id,
            })
        } else {
            None
        }
    }
}

/// Scoped marker for a join in progress.
pub struct JoinPermit {
    gate: Arc<Mutex<HashSet<PlayerId>>>,
    user_id: PlayerId,
}

impl Drop for JoinPermit {
    fn drop(&mut self) {
        if let Ok(mut set) = self.gate.lock() {
            set.remove(&self.user_id);
        }
    }
}

/// Handles a validated `joinRealm` event.
pub async fn handle_join(
    ctx: &ServerContext,
    socket_id: ConnectionId,
    user_id: PlayerId,
    realm_id: RealmId,
    share_id: Option<Uuid>,
) {
    let Some(_permit) = ctx.join_gate.try_acquire(user_id) else {
        ctx.connections
            .send(
                socket_id,
                &ServerEvent::JoinFailed {
                    reason: "Already joining a space.".to_string(),
                },
            )
            .await;
        return;
    };

    let Some(record) = ctx.directory.store.load_realm(realm_id).await else {
        join_failed(ctx, socket_id, "Space not found").await;
        return;
    };

    let Some(profile) = ctx.directory.store.load_profile(user_id).await else {
        join_failed(ctx, socket_id, "Failed to get profile").await;
        return;
    };

    // Authorization: owners always enter; everyone else needs the share
    // link when the realm has one.
    if user_id != record.owner_id {
        match (record.share_id, share_id) {
            (None, _) => {}
            (Some(_), None) => {
                join_failed(ctx, socket_id, "This realm requires a share link.").await;
                return;
            }
            (Some(expected), Some(supplied)) if supplied != expected => {
                join_failed(ctx, socket_id, "The share link has been changed.").await;
                return;
            }
            (Some(_), Some(_)) => {}
        }
    }

    let snapshot = match RealmSnapshot::from_record(&record) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("🗺️ Realm {realm_id} has unusable map data: {e}");
            join_failed(ctx, socket_id, "The realm could not be loaded.").await;
            return;
        }
    };

    // Resolve the display name recorded at handshake authentication.
    let username = match ctx.registry.principal(user_id).await {
        Some(principal) => principal.username,
        None => {
            debug!("👤 Join from socket {socket_id} with no authenticated principal");
            join_failed(ctx, socket_id, "Failed to get profile").await;
            return;
        }
    };

    // A user logged in elsewhere is kicked before the new player is added,
    // which is what makes reconnects seamless. A re-join arriving on the
    // socket that already owns the player (same realm again, or switching
    // realms over one connection) must not kick itself: the player leaves
    // its current session in place and the connection stays open.
    if let Some(current) = ctx.sessions.session_of(user_id).await {
        let same_socket = current
            .player(user_id)
            .await
            .map(|p| p.socket_id == socket_id)
            .unwrap_or(false);
        if same_socket {
            if let Some(departure) = ctx.sessions.kick_player(user_id).await {
                ctx.connections
                    .send_to_all(
                        &departure.removal.room_sockets,
                        &ServerEvent::PlayerLeftRoom { uid: user_id },
                    )
                    .await;
                send_shifts(ctx, &departure.removal.shifts).await;
            }
        } else {
            super::kick_player(
                ctx,
                user_id,
                &ServerEvent::Kicked {
                    reason: "You have logged in from another location.".to_string(),
                },
            )
            .await;
        }
    }

    let realm = WireRealm {
        id: record.id,
        owner_id: record.owner_id,
        room_count: snapshot.map.room_count(),
    };
    let (_session, outcome) = ctx
        .sessions
        .join(snapshot, socket_id, user_id, username, profile.skin)
        .await;

    let newcomer = WirePlayer::from(&outcome.player);
    ctx.connections
        .send(
            socket_id,
            &ServerEvent::JoinedRoom {
                realm,
                player: newcomer.clone(),
                room_index: outcome.player.room_index,
            },
        )
        .await;

    // The same event type flows both ways: the room learns about the
    // newcomer, and the newcomer learns about each existing occupant.
    let roommate_sockets: Vec<ConnectionId> =
        outcome.roommates.iter().map(|p| p.socket_id).collect();
    ctx.connections
        .send_to_all(&roommate_sockets, &ServerEvent::PlayerJoinedRoom(newcomer))
        .await;
    for roommate in &outcome.roommates {
        ctx.connections
            .send(
                socket_id,
                &ServerEvent::PlayerJoinedRoom(WirePlayer::from(roommate)),
            )
            .await;
    }

    send_shifts(ctx, &outcome.shifts).await;

    info!("🎮 Player {user_id} joined realm {realm_id}");
}

async fn join_failed(ctx: &ServerContext, socket_id: ConnectionId, reason: &str) {
    ctx.connections
        .send(
            socket_id,
            &ServerEvent::JoinFailed {
                reason: reason.to_string(),
            },
        )
        .await;
}
