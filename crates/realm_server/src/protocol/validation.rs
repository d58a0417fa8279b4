//! Inbound payload validation.
//!
//! A pure function maps `(event name, payload)` to a typed [`ClientEvent`]
//! or a [`ValidationError`] naming the offending path. Nothing here touches
//! server state; the dispatcher decides what a failure means (silent drop,
//! or `joinFailed` for the join event).

use serde_json::Value;
use uuid::Uuid;

use crate::session::COORDINATE_LIMIT;
use crate::types::{PlayerId, RealmId};

/// Maximum skin identifier length.
pub const MAX_SKIN_LEN: usize = 50;
/// Maximum chat message length after whitespace normalization.
pub const MAX_MESSAGE_LEN: usize = 500;

/// A payload constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed at {path}: {reason}")]
pub struct ValidationError {
    /// JSONPath-ish location of the violation, e.g. `$.x`.
    pub path: String,
    /// Human-readable description of the constraint that failed.
    pub reason: String,
}

impl ValidationError {
    fn at(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Event kinds, used as rate-limit bucket keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JoinRealm,
    MovePlayer,
    Teleport,
    ChangedSkin,
    SendMessage,
    KickPlayer,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::JoinRealm => "joinRealm",
            EventKind::MovePlayer => "movePlayer",
            EventKind::Teleport => "teleport",
            EventKind::ChangedSkin => "changedSkin",
            EventKind::SendMessage => "sendMessage",
            EventKind::KickPlayer => "kickPlayer",
        }
    }
}

/// A validated client-to-server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinRealm {
        realm_id: RealmId,
        share_id: Option<Uuid>,
    },
    MovePlayer {
        x: f64,
        y: f64,
    },
    Teleport {
        x: f64,
        y: f64,
        room_index: usize,
    },
    ChangedSkin {
        skin: String,
    },
    SendMessage {
        message: String,
    },
    KickPlayer {
        uid: PlayerId,
    },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::JoinRealm { .. } => EventKind::JoinRealm,
            ClientEvent::MovePlayer { .. } => EventKind::MovePlayer,
            ClientEvent::Teleport { .. } => EventKind::Teleport,
            ClientEvent::ChangedSkin { .. } => EventKind::ChangedSkin,
            ClientEvent::SendMessage { .. } => EventKind::SendMessage,
            ClientEvent::KickPlayer { .. } => EventKind::KickPlayer,
        }
    }
}

/// Validates an event payload against its schema.
pub fn parse_event(event: &str, data: &Value) -> Result<ClientEvent, ValidationError> {
    match event {
        "joinRealm" => parse_join_realm(data),
        "movePlayer" => parse_move_player(data),
        "teleport" => parse_teleport(data),
        "changedSkin" => parse_changed_skin(data),
        "sendMessage" => parse_send_message(data),
        "kickPlayer" => parse_kick_player(data),
        other => Err(ValidationError::at(
            "$.event",
            format!("unknown event '{other}'"),
        )),
    }
}

fn parse_join_realm(data: &Value) -> Result<ClientEvent, ValidationError> {
    let obj = as_object(data)?;
    let realm_id = match obj.get("realmId").and_then(Value::as_str) {
        Some(s) => RealmId::parse(s)
            .map_err(|_| ValidationError::at("$.realmId", "not a valid UUID"))?,
        None => return Err(ValidationError::at("$.realmId", "missing or not a string")),
    };

    // An absent or empty shareId both mean "no share link supplied".
    let share_id = match obj.get("shareId") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(
            Uuid::parse_str(s).map_err(|_| ValidationError::at("$.shareId", "not a valid UUID"))?,
        ),
        Some(_) => return Err(ValidationError::at("$.shareId", "not a string")),
    };

    Ok(ClientEvent::JoinRealm { realm_id, share_id })
}

fn parse_move_player(data: &Value) -> Result<ClientEvent, ValidationError> {
    let obj = as_object(data)?;
    let x = coordinate(obj, "x")?;
    let y = coordinate(obj, "y")?;
    Ok(ClientEvent::MovePlayer { x, y })
}

fn parse_teleport(data: &Value) -> Result<ClientEvent, ValidationError> {
    let obj = as_object(data)?;
    let x = coordinate(obj, "x")?;
    let y = coordinate(obj, "y")?;
    let room_index = match obj.get("roomIndex").and_then(Value::as_u64) {
        Some(n) => n as usize,
        None => {
            return Err(ValidationError::at(
                "$.roomIndex",
                "missing or not a non-negative integer",
            ))
        }
    };
    Ok(ClientEvent::Teleport { x, y, room_index })
}

fn parse_changed_skin(data: &Value) -> Result<ClientEvent, ValidationError> {
    let skin = data
        .as_str()
        .ok_or_else(|| ValidationError::at("$", "not a string"))?;
    if skin.is_empty() || skin.chars().count() > MAX_SKIN_LEN {
        return Err(ValidationError::at(
            "$",
            format!("length must be 1..={MAX_SKIN_LEN}"),
        ));
    }
    if !skin
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::at(
            "$",
            "only [A-Za-z0-9_-] characters are allowed",
        ));
    }
    Ok(ClientEvent::ChangedSkin {
        skin: skin.to_string(),
    })
}

fn parse_send_message(data: &Value) -> Result<ClientEvent, ValidationError> {
    let raw = data
        .as_str()
        .ok_or_else(|| ValidationError::at("$", "not a string"))?;
    // Trim and collapse runs of whitespace to a single space.
    let message = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if message.is_empty() {
        return Err(ValidationError::at("$", "empty after trimming"));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ValidationError::at(
            "$",
            format!("longer than {MAX_MESSAGE_LEN} characters"),
        ));
    }
    Ok(ClientEvent::SendMessage { message })
}

fn parse_kick_player(data: &Value) -> Result<ClientEvent, ValidationError> {
    let obj = as_object(data)?;
    let uid = match obj.get("uid").and_then(Value::as_str) {
        Some(s) => {
            PlayerId::parse(s).map_err(|_| ValidationError::at("$.uid", "not a valid UUID"))?
        }
        None => return Err(ValidationError::at("$.uid", "missing or not a string")),
    };
    Ok(ClientEvent::KickPlayer { uid })
}

fn as_object(data: &Value) -> Result<&serde_json::Map<String, Value>, ValidationError> {
    data.as_object()
        .ok_or_else(|| ValidationError::at("$", "payload must be an object"))
}

fn coordinate(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<f64, ValidationError> {
    let path = format!("$.{field}");
    let value = obj
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| ValidationError::at(&path, "missing or not a number"))?;
    if !value.is_finite() {
        return Err(ValidationError::at(&path, "not finite"));
    }
    if value.abs() > COORDINATE_LIMIT {
        return Err(ValidationError::at(
            &path,
            format!("outside [-{COORDINATE_LIMIT}, {COORDINATE_LIMIT}]"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_realm_accepts_optional_share_id() {
        let realm = Uuid::new_v4();
        let share = Uuid::new_v4();

        let parsed = parse_event("joinRealm", &json!({"realmId": realm.to_string()})).unwrap();
        assert!(matches!(parsed, ClientEvent::JoinRealm { share_id: None, .. }));

        let parsed = parse_event(
            "joinRealm",
            &json!({"realmId": realm.to_string(), "shareId": ""}),
        )
        .unwrap();
        assert!(matches!(parsed, ClientEvent::JoinRealm { share_id: None, .. }));

        let parsed = parse_event(
            "joinRealm",
            &json!({"realmId": realm.to_string(), "shareId": share.to_string()}),
        )
        .unwrap();
        assert!(
            matches!(parsed, ClientEvent::JoinRealm { share_id: Some(s), .. } if s == share)
        );
    }

    #[test]
    fn join_realm_rejects_bad_ids() {
        assert!(parse_event("joinRealm", &json!({"realmId": "nope"})).is_err());
        assert!(parse_event("joinRealm", &json!({})).is_err());
        assert!(parse_event(
            "joinRealm",
            &json!({"realmId": Uuid::new_v4().to_string(), "shareId": 5})
        )
        .is_err());
    }

    #[test]
    fn move_player_bounds_and_finiteness() {
        assert!(parse_event("movePlayer", &json!({"x": 0.0, "y": 0.0})).is_ok());
        assert!(parse_event("movePlayer", &json!({"x": 10_000.0, "y": -10_000.0})).is_ok());

        let err = parse_event("movePlayer", &json!({"x": 10_001.0, "y": 0.0})).unwrap_err();
        assert_eq!(err.path, "$.x");

        // JSON cannot carry NaN/Infinity as numbers; they arrive as nulls
        // or strings and fail the type check.
        assert!(parse_event("movePlayer", &json!({"x": null, "y": 0.0})).is_err());
        assert!(parse_event("movePlayer", &json!({"x": "1.0", "y": 0.0})).is_err());
        assert!(parse_event("movePlayer", &json!({"y": 0.0})).is_err());
    }

    #[test]
    fn teleport_requires_non_negative_room_index() {
        let parsed =
            parse_event("teleport", &json!({"x": 1.0, "y": 2.0, "roomIndex": 3})).unwrap();
        assert_eq!(
            parsed,
            ClientEvent::Teleport {
                x: 1.0,
                y: 2.0,
                room_index: 3
            }
        );

        assert!(parse_event("teleport", &json!({"x": 1.0, "y": 2.0, "roomIndex": -1})).is_err());
        assert!(parse_event("teleport", &json!({"x": 1.0, "y": 2.0})).is_err());
    }

    #[test]
    fn changed_skin_charset_and_length() {
        assert!(parse_event("changedSkin", &json!("robot_2-blue")).is_ok());
        assert!(parse_event("changedSkin", &json!("")).is_err());
        assert!(parse_event("changedSkin", &json!("a".repeat(51))).is_err());
        assert!(parse_event("changedSkin", &json!("has space")).is_err());
        assert!(parse_event("changedSkin", &json!({"skin": "robot"})).is_err());
    }

    #[test]
    fn send_message_normalizes_whitespace() {
        let parsed = parse_event("sendMessage", &json!("  hello   there \n world  ")).unwrap();
        assert_eq!(
            parsed,
            ClientEvent::SendMessage {
                message: "hello there world".to_string()
            }
        );

        assert!(parse_event("sendMessage", &json!("   \n\t  ")).is_err());
        assert!(parse_event("sendMessage", &json!("x".repeat(501))).is_err());
        // 500 chars exactly is fine.
        assert!(parse_event("sendMessage", &json!("x".repeat(500))).is_ok());
    }

    #[test]
    fn kick_player_requires_uuid() {
        let uid = Uuid::new_v4();
        let parsed = parse_event("kickPlayer", &json!({"uid": uid.to_string()})).unwrap();
        assert_eq!(
            parsed,
            ClientEvent::KickPlayer {
                uid: PlayerId(uid)
            }
        );
        assert!(parse_event("kickPlayer", &json!({"uid": 7})).is_err());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = parse_event("fly", &json!({})).unwrap_err();
        assert_eq!(err.path, "$.event");
    }
}
