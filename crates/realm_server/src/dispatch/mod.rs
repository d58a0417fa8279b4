//! Event dispatcher.
//!
//! One inbound frame is one bounded unit of work: it is parsed, validated,
//! rate-limited, applied to the owning session, and fanned out to the
//! sockets of the affected room. Errors never escape this module; a frame
//! either succeeds silently (broadcasts sent) or produces exactly one
//! error-class message back to the originator.

pub mod join;

pub use join::JoinGate;

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::connection::{ConnectionId, ConnectionManager};
use crate::directory::Directory;
use crate::protocol::{
    ClientEvent, Envelope, ErrorCode, ServerEvent, TerminationCode, ValidationError,
};
use crate::registry::UserRegistry;
use crate::security::SecurityManager;
use crate::session::{ProximityShift, SessionError, SessionManager};
use crate::types::{PlayerId, RealmId};

/// Shared handles every dispatcher invocation needs.
#[derive(Clone)]
pub struct ServerContext {
    pub sessions: Arc<SessionManager>,
    pub connections: Arc<ConnectionManager>,
    pub registry: Arc<UserRegistry>,
    pub security: Arc<SecurityManager>,
    pub directory: Directory,
    pub join_gate: JoinGate,
}

/// Handles one raw text frame from an authenticated connection.
pub async fn handle_frame(
    ctx: &ServerContext,
    socket_id: ConnectionId,
    user_id: PlayerId,
    text: &str,
) {
    if let Err(e) = ctx.security.validate_message_size(text.len()) {
        debug!("📏 Dropping oversized frame from {user_id}: {e}");
        return;
    }

    // A superseded connection (the user re-authenticated elsewhere) may
    // still be draining frames; only the socket currently bound to the
    // user is allowed to act for it.
    if ctx.registry.socket_of(user_id).await != Some(socket_id) {
        trace!("🗑️ Frame from stale socket {socket_id} for {user_id}");
        return;
    }

    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            trace!("🗑️ Unparseable frame from {user_id}: {e}");
            return;
        }
    };

    let event = match crate::protocol::validation::parse_event(&envelope.event, &envelope.data) {
        Ok(event) => event,
        Err(e) => {
            drop_invalid(ctx, socket_id, user_id, &envelope.event, e).await;
            return;
        }
    };

    if !ctx.security.check_rate_limit(user_id, event.kind()).await {
        ctx.connections
            .send(
                socket_id,
                &ServerEvent::Error {
                    event: event.kind().as_str().to_string(),
                    code: ErrorCode::RateLimited,
                    message: "Rate limit exceeded".to_string(),
                },
            )
            .await;
        return;
    }

    match event {
        ClientEvent::JoinRealm { realm_id, share_id } => {
            join::handle_join(ctx, socket_id, user_id, realm_id, share_id).await;
        }
        other => {
            // Everything but join requires an existing session membership.
            let Some(session) = ctx.sessions.session_of(user_id).await else {
                trace!(
                    "🗑️ '{}' from {user_id} without a session",
                    other.kind().as_str()
                );
                return;
            };
            match other {
                ClientEvent::MovePlayer { x, y } => {
                    match session.move_player(user_id, x, y).await {
                        Ok(outcome) => {
                            ctx.connections
                                .send_to_all(
                                    &outcome.room_sockets,
                                    &ServerEvent::PlayerMoved {
                                        uid: user_id,
                                        x,
                                        y,
                                    },
                                )
                                .await;
                            send_shifts(ctx, &outcome.shifts).await;
                        }
                        Err(e) => debug!("🚶 movePlayer rejected for {user_id}: {e}"),
                    }
                }
                ClientEvent::Teleport { x, y, room_index } => {
                    match session.change_room(user_id, room_index, x, y).await {
                        Ok(outcome) => {
                            let event = ServerEvent::PlayerTeleported {
                                uid: user_id,
                                x,
                                y,
                                room_index,
                            };
                            // The two lists coincide when the teleport
                            // stays in the same room; each socket gets the
                            // event once.
                            let mut targets = outcome.old_room_sockets;
                            for socket in outcome.new_room_sockets {
                                if !targets.contains(&socket) {
                                    targets.push(socket);
                                }
                            }
                            ctx.connections.send_to_all(&targets, &event).await;
                            send_shifts(ctx, &outcome.shifts).await;
                        }
                        Err(SessionError::BadRoom(index)) => {
                            debug!("🚪 teleport from {user_id} to unknown room {index}")
                        }
                        Err(e) => debug!("🚪 teleport rejected for {user_id}: {e}"),
                    }
                }
                ClientEvent::ChangedSkin { skin } => {
                    match session.set_skin(user_id, skin.clone()).await {
                        Ok(audience) => {
                            ctx.connections
                                .send_to_all(
                                    &audience.room_sockets,
                                    &ServerEvent::PlayerChangedSkin {
                                        uid: user_id,
                                        skin,
                                    },
                                )
                                .await;
                        }
                        Err(e) => debug!("🎨 changedSkin rejected for {user_id}: {e}"),
                    }
                }
                ClientEvent::SendMessage { message } => {
                    match session.room_audience(user_id).await {
                        Ok(audience) => {
                            ctx.connections
                                .send_to_all(
                                    &audience.room_sockets,
                                    &ServerEvent::ReceiveMessage {
                                        uid: user_id,
                                        message,
                                    },
                                )
                                .await;
                        }
                        Err(e) => debug!("💬 sendMessage rejected for {user_id}: {e}"),
                    }
                }
                ClientEvent::KickPlayer { uid } => {
                    // Only the realm owner may kick.
                    if session.realm().owner_id != user_id {
                        debug!("🥾 kickPlayer from non-owner {user_id} ignored");
                        return;
                    }
                    if !session.contains(uid).await {
                        debug!("🥾 kickPlayer target {uid} is not in the realm");
                        return;
                    }
                    kick_player(
                        ctx,
                        uid,
                        &ServerEvent::SessionTerminated {
                            code: TerminationCode::OwnerKicked,
                            reason: "You have been kicked by the realm owner.".to_string(),
                        },
                    )
                    .await;
                }
                ClientEvent::JoinRealm { .. } => unreachable!("handled above"),
            }
        }
    }
}

/// Forcibly removes a player, delivering `terminal` to its socket before
/// closing it and notifying the vacated room.
pub async fn kick_player(ctx: &ServerContext, user_id: PlayerId, terminal: &ServerEvent) {
    let Some(departure) = ctx.sessions.kick_player(user_id).await else {
        return;
    };

    ctx.connections
        .close_with(departure.removal.player.socket_id, terminal)
        .await;
    ctx.connections
        .send_to_all(
            &departure.removal.room_sockets,
            &ServerEvent::PlayerLeftRoom { uid: user_id },
        )
        .await;
    send_shifts(ctx, &departure.removal.shifts).await;

    info!(
        "🥾 Kicked {user_id} from realm {} ({})",
        departure.realm_id,
        terminal.name()
    );
}

/// Tears down the session of a realm whose persisted record changed or
/// disappeared, terminating every member's connection.
pub async fn evict_realm(
    ctx: &ServerContext,
    realm_id: RealmId,
    code: TerminationCode,
    reason: &str,
) {
    let Some(eviction) = ctx.sessions.evict_realm(realm_id).await else {
        return;
    };

    let terminal = ServerEvent::SessionTerminated {
        code,
        reason: reason.to_string(),
    };
    for (_user_id, socket_id) in &eviction.players {
        ctx.connections.close_with(*socket_id, &terminal).await;
    }
}

/// Cleans up after a connection ends for any reason.
///
/// If the socket still owned a player, the player leaves its session and
/// the room is notified. The registry entry is only removed when it still
/// belongs to this socket, so a reconnect that already re-bound the user
/// is left untouched.
pub async fn disconnect(ctx: &ServerContext, socket_id: ConnectionId) {
    if let Some(departure) = ctx.sessions.log_out_by_socket(socket_id).await {
        ctx.connections
            .send_to_all(
                &departure.removal.room_sockets,
                &ServerEvent::PlayerLeftRoom {
                    uid: departure.user_id,
                },
            )
            .await;
        send_shifts(ctx, &departure.removal.shifts).await;
        info!(
            "👋 Player {} left realm {} (disconnect)",
            departure.user_id, departure.realm_id
        );
    }

    if let Some(user_id) = ctx.connections.user_of(socket_id).await {
        ctx.registry.remove_if_socket(user_id, socket_id).await;
    }

    if let Some(addr) = ctx.connections.remove(socket_id).await {
        ctx.security.on_disconnect(addr.ip()).await;
    }
}

/// Delivers a `proximityUpdate` to each player whose group changed.
pub(crate) async fn send_shifts(ctx: &ServerContext, shifts: &[ProximityShift]) {
    for shift in shifts {
        ctx.connections
            .send(
                shift.socket,
                &ServerEvent::ProximityUpdate {
                    proximity_id: shift.group.as_wire(),
                },
            )
            .await;
    }
}

async fn drop_invalid(
    ctx: &ServerContext,
    socket_id: ConnectionId,
    user_id: PlayerId,
    event: &str,
    error: ValidationError,
) {
    // Invalid payloads are dropped silently, except joins, which answer so
    // the client can surface something actionable.
    if event == "joinRealm" {
        ctx.connections
            .send(
                socket_id,
                &ServerEvent::JoinFailed {
                    reason: error.to_string(),
                },
            )
            .await;
    } else {
        debug!("🗑️ Invalid '{event}' from {user_id}: {error}");
    }
}
