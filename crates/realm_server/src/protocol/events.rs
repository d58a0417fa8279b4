//! Outbound event definitions.
//!
//! Each server-to-client event encodes itself into the wire envelope. The
//! payload shapes follow the protocol contract; field names are camelCase
//! on the wire.

use serde::Serialize;
use serde_json::json;

use crate::session::Player;
use crate::types::{PlayerId, RealmId};

/// Player as presented on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlayer {
    pub uid: PlayerId,
    pub username: String,
    pub skin: String,
    pub room_index: usize,
    pub x: f64,
    pub y: f64,
    pub proximity_id: String,
}

impl From<&Player> for WirePlayer {
    fn from(player: &Player) -> Self {
        Self {
            uid: player.user_id,
            username: player.username.clone(),
            skin: player.skin.clone(),
            room_index: player.room_index,
            x: player.x,
            y: player.y,
            proximity_id: player.proximity_id.as_wire(),
        }
    }
}

/// Realm identity and shape, as delivered in the join acknowledgement.
/// The map itself reaches clients through the HTTP surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRealm {
    pub id: RealmId,
    pub owner_id: PlayerId,
    pub room_count: usize,
}

/// Codes carried by `sessionTerminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCode {
    RealmUpdated,
    RealmDeleted,
    OwnerKicked,
    ServerRestart,
}

impl TerminationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationCode::RealmUpdated => "REALM_UPDATED",
            TerminationCode::RealmDeleted => "REALM_DELETED",
            TerminationCode::OwnerKicked => "OWNER_KICKED",
            TerminationCode::ServerRestart => "SERVER_RESTART",
        }
    }
}

/// Codes carried by `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AuthError,
    RateLimited,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
        }
    }
}

/// Server-to-client events.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Initial state for the joining client. Originator only.
    JoinedRoom {
        realm: WireRealm,
        player: WirePlayer,
        room_index: usize,
    },
    /// Join rejected; the payload is the human-readable reason.
    JoinFailed { reason: String },
    /// A player entered the recipient's room (also used to describe the
    /// existing occupants to a newly joined client).
    PlayerJoinedRoom(WirePlayer),
    /// A player left the recipient's room; payload is the user id.
    PlayerLeftRoom { uid: PlayerId },
    PlayerMoved {
        uid: PlayerId,
        x: f64,
        y: f64,
    },
    PlayerTeleported {
        uid: PlayerId,
        x: f64,
        y: f64,
        room_index: usize,
    },
    PlayerChangedSkin {
        uid: PlayerId,
        skin: String,
    },
    ReceiveMessage {
        uid: PlayerId,
        message: String,
    },
    /// The recipient's own proximity group changed.
    ProximityUpdate { proximity_id: String },
    /// Terminal: the recipient was forcibly removed (duplicate login).
    Kicked { reason: String },
    /// Terminal: the recipient's session ended.
    SessionTerminated {
        code: TerminationCode,
        reason: String,
    },
    /// An inbound message was rejected.
    Error {
        event: String,
        code: ErrorCode,
        message: String,
    },
}

impl ServerEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::JoinedRoom { .. } => "joinedRoom",
            ServerEvent::JoinFailed { .. } => "joinFailed",
            ServerEvent::PlayerJoinedRoom(_) => "playerJoinedRoom",
            ServerEvent::PlayerLeftRoom { .. } => "playerLeftRoom",
            ServerEvent::PlayerMoved { .. } => "playerMoved",
            ServerEvent::PlayerTeleported { .. } => "playerTeleported",
            ServerEvent::PlayerChangedSkin { .. } => "playerChangedSkin",
            ServerEvent::ReceiveMessage { .. } => "receiveMessage",
            ServerEvent::ProximityUpdate { .. } => "proximityUpdate",
            ServerEvent::Kicked { .. } => "kicked",
            ServerEvent::SessionTerminated { .. } => "sessionTerminated",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Whether this event ends the connection after delivery.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerEvent::Kicked { .. } | ServerEvent::SessionTerminated { .. }
        )
    }

    /// Encodes the event into its wire envelope.
    pub fn encode(&self) -> String {
        let data = match self {
            ServerEvent::JoinedRoom {
                realm,
                player,
                room_index,
            } => json!({
                "realm": realm,
                "player": player,
                "roomIndex": room_index,
            }),
            ServerEvent::JoinFailed { reason } => json!(reason),
            ServerEvent::PlayerJoinedRoom(player) => json!(player),
            ServerEvent::PlayerLeftRoom { uid } => json!(uid),
            ServerEvent::PlayerMoved { uid, x, y } => json!({
                "uid": uid, "x": x, "y": y,
            }),
            ServerEvent::PlayerTeleported {
                uid,
                x,
                y,
                room_index,
            } => json!({
                "uid": uid, "x": x, "y": y, "roomIndex": room_index,
            }),
            ServerEvent::PlayerChangedSkin { uid, skin } => json!({
                "uid": uid, "skin": skin,
            }),
            ServerEvent::ReceiveMessage { uid, message } => json!({
                "uid": uid, "message": message,
            }),
            ServerEvent::ProximityUpdate { proximity_id } => json!({
                "proximityId": proximity_id,
            }),
            ServerEvent::Kicked { reason } => json!(reason),
            ServerEvent::SessionTerminated { code, reason } => json!({
                "code": code.as_str(), "reason": reason,
            }),
            ServerEvent::Error {
                event,
                code,
                message,
            } => json!({
                "event": event, "code": code.as_str(), "message": message,
            }),
        };
        json!({ "event": self.name(), "data": data }).to_string()
    }
}
