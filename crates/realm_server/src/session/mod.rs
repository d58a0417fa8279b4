//! Per-realm session state.
//!
//! A [`Session`] is the in-memory runtime instance of one realm: the players
//! currently inside it, their rooms and positions, and one
//! [`ProximityIndex`] per occupied room. All of it lives under the session's
//! own mutex; every operation returns an outcome struct that bundles the
//! proximity change set with a snapshot of recipient socket ids taken under
//! that lock, so the dispatcher can fan out broadcasts without holding it.

pub mod manager;

pub use manager::SessionManager;

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::connection::ConnectionId;
use crate::directory::RealmRecord;
use crate::proximity::ProximityIndex;
use crate::realm::{MapError, RealmMap};
use crate::types::{PlayerId, ProximityId, RealmId};

/// Coordinates are confined to this range on both axes.
pub const COORDINATE_LIMIT: f64 = 10_000.0;

/// Errors surfaced by session mutators.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// The user is not a member of this session.
    #[error("player {0} is not in this session")]
    UnknownPlayer(PlayerId),

    /// The requested room index does not exist in the realm.
    #[error("room index {0} is not part of this realm")]
    BadRoom(usize),
}

/// The slice of a persisted realm a session needs, fixed at creation.
///
/// If the persisted record changes while the session is live, the session is
/// evicted rather than updated; see [`SessionManager::evict_realm`].
#[derive(Debug, Clone)]
pub struct RealmSnapshot {
    pub id: RealmId,
    pub owner_id: PlayerId,
    pub share_id: Option<Uuid>,
    pub map: RealmMap,
}

impl RealmSnapshot {
    /// Builds a snapshot from a store record by parsing its map data.
    pub fn from_record(record: &RealmRecord) -> Result<Self, MapError> {
        Ok(Self {
            id: record.id,
            owner_id: record.owner_id,
            share_id: record.share_id,
            map: RealmMap::parse(&record.map_data)?,
        })
    }
}

/// A player present in a session.
#[derive(Debug, Clone)]
pub struct Player {
    pub user_id: PlayerId,
    pub username: String,
    pub skin: String,
    pub socket_id: ConnectionId,
    pub room_index: usize,
    pub x: f64,
    pub y: f64,
    pub proximity_id: ProximityId,
}

/// A proximity reassignment addressed to a concrete socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityShift {
    pub player: PlayerId,
    pub socket: ConnectionId,
    pub group: ProximityId,
}

/// Result of [`Session::add_player`].
#[derive(Debug)]
pub struct AddOutcome {
    /// Snapshot of the newly created player.
    pub player: Player,
    /// Players already present in the spawn room, for the join handshake.
    pub roommates: Vec<Player>,
    pub shifts: Vec<ProximityShift>,
}

/// Result of [`Session::remove_player`].
#[derive(Debug)]
pub struct RemoveOutcome {
    /// Snapshot of the removed player.
    pub player: Player,
    /// Sockets of the players remaining in the vacated room.
    pub room_sockets: Vec<ConnectionId>,
    pub shifts: Vec<ProximityShift>,
}

/// Result of [`Session::move_player`].
#[derive(Debug)]
pub struct MoveOutcome {
    /// Sockets of the other players in the mover's room.
    pub room_sockets: Vec<ConnectionId>,
    pub shifts: Vec<ProximityShift>,
}

/// Result of [`Session::change_room`].
#[derive(Debug)]
pub struct RoomChangeOutcome {
    /// Sockets of players remaining in the vacated room.
    pub old_room_sockets: Vec<ConnectionId>,
    /// Sockets of players already in the destination room.
    pub new_room_sockets: Vec<ConnectionId>,
    pub shifts: Vec<ProximityShift>,
}

/// Result of [`Session::set_skin`] and of chat lookups.
#[derive(Debug)]
pub struct RoomAudience {
    /// The room the acting player is in.
    pub room_index: usize,
    /// Sockets of the other players in that room.
    pub room_sockets: Vec<ConnectionId>,
}

#[derive(Debug, Default)]
struct SessionState {
    players: HashMap<PlayerId, Player>,
    proximity: HashMap<usize, ProximityIndex>,
}

impl SessionState {
    fn sockets_in_room_except(&self, room_index: usize, except: PlayerId) -> Vec<ConnectionId> {
        self.players
            .values()
            .filter(|p| p.room_index == room_index && p.user_id != except)
            .map(|p| p.socket_id)
            .collect()
    }

    /// Applies a proximity change set to the player records and resolves
    /// each changed player to its socket. Players no longer in the map
    /// (just removed) are skipped.
    fn apply_shifts(&mut self, changes: Vec<crate::proximity::GroupChange>) -> Vec<ProximityShift> {
        let mut shifts = Vec::with_capacity(changes.len());
        for change in changes {
            if let Some(player) = self.players.get_mut(&change.player) {
                player.proximity_id = change.group;
                shifts.push(ProximityShift {
                    player: change.player,
                    socket: player.socket_id,
                    group: change.group,
                });
            }
        }
        shifts
    }
}

/// The live state of one realm.
pub struct Session {
    realm: RealmSnapshot,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(realm: RealmSnapshot) -> Self {
        Self {
            realm,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// The realm snapshot this session was created from.
    pub fn realm(&self) -> &RealmSnapshot {
        &self.realm
    }

    /// Creates a player at the default room's spawn point and inserts it
    /// into the room's proximity index.
    ///
    /// The outcome carries the newcomer, the players it shares the spawn
    /// room with, and the proximity shifts (which may include the newcomer
    /// itself when it lands next to someone).
    pub async fn add_player(
        &self,
        socket_id: ConnectionId,
        user_id: PlayerId,
        username: String,
        skin: String,
    ) -> AddOutcome {
        let (spawn_x, spawn_y) = self.realm.map.default_spawn();
        let mut state = self.state.lock().await;

        let player = Player {
            user_id,
            username,
            skin,
            socket_id,
            room_index: 0,
            x: spawn_x,
            y: spawn_y,
            proximity_id: ProximityId::Solo,
        };
        state.players.insert(user_id, player.clone());

        let changes = state
            .proximity
            .entry(0)
            .or_default()
            .insert(user_id, spawn_x, spawn_y);
        let shifts = state.apply_shifts(changes);

        let roommates = state
            .players
            .values()
            .filter(|p| p.room_index == 0 && p.user_id != user_id)
            .cloned()
            .collect();
        let player = state.players[&user_id].clone();

        AddOutcome {
            player,
            roommates,
            shifts,
        }
    }

    /// Removes a player from the player map and its room's proximity index.
    pub async fn remove_player(&self, user_id: PlayerId) -> Result<RemoveOutcome, SessionError> {
        let mut state = self.state.lock().await;
        let player = state
            .players
            .remove(&user_id)
            .ok_or(SessionError::UnknownPlayer(user_id))?;

        let changes = match state.proximity.get_mut(&player.room_index) {
            Some(index) => {
                let changes = index.remove(user_id);
                if index.is_empty() {
                    state.proximity.remove(&player.room_index);
                }
                changes
            }
            None => Vec::new(),
        };
        let shifts = state.apply_shifts(changes);
        let room_sockets = state.sockets_in_room_except(player.room_index, user_id);

        Ok(RemoveOutcome {
            player,
            room_sockets,
            shifts,
        })
    }

    /// Updates a player's position within its current room.
    ///
    /// Range checking happens at the dispatcher; the session still confines
    /// the stored value to [`COORDINATE_LIMIT`].
    pub async fn move_player(
        &self,
        user_id: PlayerId,
        x: f64,
        y: f64,
    ) -> Result<MoveOutcome, SessionError> {
        let x = x.clamp(-COORDINATE_LIMIT, COORDINATE_LIMIT);
        let y = y.clamp(-COORDINATE_LIMIT, COORDINATE_LIMIT);

        let mut state = self.state.lock().await;
        let room_index = {
            let player = state
                .players
                .get_mut(&user_id)
                .ok_or(SessionError::UnknownPlayer(user_id))?;
            player.x = x;
            player.y = y;
            player.room_index
        };

        let changes = match state.proximity.get_mut(&room_index) {
            Some(index) => index.move_to(user_id, x, y),
            None => Vec::new(),
        };
        let shifts = state.apply_shifts(changes);
        let room_sockets = state.sockets_in_room_except(room_index, user_id);

        Ok(MoveOutcome {
            room_sockets,
            shifts,
        })
    }

    /// Moves a player to another room at the given position.
    ///
    /// Removes it from the old room's proximity index and inserts it into
    /// the new room's; both rooms may contribute proximity shifts. A
    /// teleport that stays in the player's current room (map teleports may
    /// point at the same room) is a plain positional update of that one
    /// index, and the two socket lists of the outcome coincide.
    pub async fn change_room(
        &self,
        user_id: PlayerId,
        room_index: usize,
        x: f64,
        y: f64,
    ) -> Result<RoomChangeOutcome, SessionError> {
        if !self.realm.map.has_room(room_index) {
            return Err(SessionError::BadRoom(room_index));
        }
        let x = x.clamp(-COORDINATE_LIMIT, COORDINATE_LIMIT);
        let y = y.clamp(-COORDINATE_LIMIT, COORDINATE_LIMIT);

        let mut state = self.state.lock().await;
        let old_room = {
            let player = state
                .players
                .get_mut(&user_id)
                .ok_or(SessionError::UnknownPlayer(user_id))?;
            let old_room = player.room_index;
            player.room_index = room_index;
            player.x = x;
            player.y = y;
            old_room
        };

        let changes = if old_room == room_index {
            match state.proximity.get_mut(&room_index) {
                Some(index) => index.move_to(user_id, x, y),
                None => Vec::new(),
            }
        } else {
            let mut changes = match state.proximity.get_mut(&old_room) {
                Some(index) => {
                    let changes = index.remove(user_id);
                    if index.is_empty() {
                        state.proximity.remove(&old_room);
                    }
                    changes
                }
                None => Vec::new(),
            };
            changes.extend(
                state
                    .proximity
                    .entry(room_index)
                    .or_default()
                    .insert(user_id, x, y),
            );
            changes
        };
        let shifts = state.apply_shifts(changes);

        let old_room_sockets = state.sockets_in_room_except(old_room, user_id);
        let new_room_sockets = state.sockets_in_room_except(room_index, user_id);

        Ok(RoomChangeOutcome {
            old_room_sockets,
            new_room_sockets,
            shifts,
        })
    }

    /// Updates a player's skin.
    pub async fn set_skin(
        &self,
        user_id: PlayerId,
        skin: String,
    ) -> Result<RoomAudience, SessionError> {
        let mut state = self.state.lock().await;
        let room_index = {
            let player = state
                .players
                .get_mut(&user_id)
                .ok_or(SessionError::UnknownPlayer(user_id))?;
            player.skin = skin;
            player.room_index
        };
        let room_sockets = state.sockets_in_room_except(room_index, user_id);
        Ok(RoomAudience {
            room_index,
            room_sockets,
        })
    }

    /// The player's room and the other sockets in it, for chat fan-out.
    pub async fn room_audience(&self, user_id: PlayerId) -> Result<RoomAudience, SessionError> {
        let state = self.state.lock().await;
        let player = state
            .players
            .get(&user_id)
            .ok_or(SessionError::UnknownPlayer(user_id))?;
        let room_index = player.room_index;
        let room_sockets = state.sockets_in_room_except(room_index, user_id);
        Ok(RoomAudience {
            room_index,
            room_sockets,
        })
    }

    /// Snapshot of a single player.
    pub async fn player(&self, user_id: PlayerId) -> Option<Player> {
        self.state.lock().await.players.get(&user_id).cloned()
    }

    /// Snapshots of the players whose `room_index` matches.
    pub async fn players_in_room(&self, room_index: usize) -> Vec<Player> {
        self.state
            .lock()
            .await
            .players
            .values()
            .filter(|p| p.room_index == room_index)
            .cloned()
            .collect()
    }

    /// Socket ids of the players whose `room_index` matches.
    pub async fn sockets_in_room(&self, room_index: usize) -> Vec<ConnectionId> {
        self.state
            .lock()
            .await
            .players
            .values()
            .filter(|p| p.room_index == room_index)
            .map(|p| p.socket_id)
            .collect()
    }

    /// Snapshots of every player in the session.
    pub async fn players(&self) -> Vec<Player> {
        self.state.lock().await.players.values().cloned().collect()
    }

    pub async fn contains(&self, user_id: PlayerId) -> bool {
        self.state.lock().await.players.contains_key(&user_id)
    }

    pub async fn player_count(&self) -> usize {
        self.state.lock().await.players.len()
    }
}
