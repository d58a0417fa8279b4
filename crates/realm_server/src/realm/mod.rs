//! Realm map parsing.
//!
//! A realm's persisted `map_data` blob is parsed once, when a session is
//! created, into a [`RealmMap`]: the list of rooms with their spawn points
//! and typed tiles. The result is a pure value; nothing in the server ever
//! mutates it.

use std::collections::HashSet;

use serde::Deserialize;

/// Errors produced while parsing `map_data`.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The blob is not the expected JSON shape.
    #[error("malformed map data: {0}")]
    Malformed(String),

    /// A structurally valid map with zero rooms is unusable.
    #[error("map data contains no rooms")]
    NoRooms,

    /// A spawn coordinate was not a finite number.
    #[error("room {room} has a non-finite spawn coordinate")]
    BadSpawn { room: usize },

    /// A teleport tile points at a room index outside the realm.
    #[error("room {room} has a teleport to invalid room index {target}")]
    BadTeleportTarget { room: usize, target: usize },
}

/// A teleport tile: standing on `from` moves the player to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct Teleport {
    pub from_x: i64,
    pub from_y: i64,
    pub to_room: usize,
    pub to_x: f64,
    pub to_y: f64,
}

/// One room of a realm: spawn point plus typed tiles.
#[derive(Debug, Clone)]
pub struct Room {
    /// Coordinates new players spawn at.
    pub spawn: (f64, f64),
    /// Tiles players cannot occupy. Client-enforced; kept for the HTTP
    /// surface and for map sanity checks.
    pub barriers: HashSet<(i64, i64)>,
    /// Teleport tiles in this room.
    pub teleports: Vec<Teleport>,
}

/// Parsed, immutable form of a realm's `map_data`.
///
/// Room indexes are positions in [`RealmMap::rooms`]; index 0 is the default
/// spawn room and is guaranteed to exist.
#[derive(Debug, Clone)]
pub struct RealmMap {
    rooms: Vec<Room>,
}

#[derive(Deserialize)]
struct RawMap {
    rooms: Vec<RawRoom>,
}

#[derive(Deserialize)]
struct RawRoom {
    spawn: RawPoint,
    #[serde(default)]
    tiles: RawTiles,
}

#[derive(Deserialize)]
struct RawPoint {
    x: f64,
    y: f64,
}

#[derive(Deserialize, Default)]
struct RawTiles {
    #[serde(default)]
    barriers: Vec<RawTile>,
    #[serde(default)]
    teleports: Vec<RawTeleport>,
}

#[derive(Deserialize)]
struct RawTile {
    x: i64,
    y: i64,
}

#[derive(Deserialize)]
struct RawTeleport {
    from: RawTile,
    to: RawDestination,
}

#[derive(Deserialize)]
struct RawDestination {
    room_index: usize,
    x: f64,
    y: f64,
}

impl RealmMap {
    /// Parses a `map_data` JSON value into a structured map.
    ///
    /// Fails if the blob is malformed, has zero rooms, carries non-finite
    /// spawn coordinates, or contains a teleport targeting a room index the
    /// realm does not have. A session is never created from a map that does
    /// not parse.
    pub fn parse(map_data: &serde_json::Value) -> Result<Self, MapError> {
        let raw: RawMap = serde_json::from_value(map_data.clone())
            .map_err(|e| MapError::Malformed(e.to_string()))?;

        if raw.rooms.is_empty() {
            return Err(MapError::NoRooms);
        }

        let room_count = raw.rooms.len();
        let mut rooms = Vec::with_capacity(room_count);
        for (index, raw_room) in raw.rooms.into_iter().enumerate() {
            if !raw_room.spawn.x.is_finite() || !raw_room.spawn.y.is_finite() {
                return Err(MapError::BadSpawn { room: index });
            }

            let mut teleports = Vec::with_capacity(raw_room.tiles.teleports.len());
            for raw_tp in raw_room.tiles.teleports {
                if raw_tp.to.room_index >= room_count {
                    return Err(MapError::BadTeleportTarget {
                        room: index,
                        target: raw_tp.to.room_index,
                    });
                }
                teleports.push(Teleport {
                    from_x: raw_tp.from.x,
                    from_y: raw_tp.from.y,
                    to_room: raw_tp.to.room_index,
                    to_x: raw_tp.to.x,
                    to_y: raw_tp.to.y,
                });
            }

            rooms.push(Room {
                spawn: (raw_room.spawn.x, raw_room.spawn.y),
                barriers: raw_room
                    .tiles
                    .barriers
                    .into_iter()
                    .map(|t| (t.x, t.y))
                    .collect(),
                teleports,
            });
        }

        Ok(Self { rooms })
    }

    /// Number of rooms in the realm. Always ≥ 1.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Whether `index` names a room of this realm.
    pub fn has_room(&self, index: usize) -> bool {
        index < self.rooms.len()
    }

    /// The room at `index`, if present.
    pub fn room(&self, index: usize) -> Option<&Room> {
        self.rooms.get(index)
    }

    /// Spawn coordinates of the default room (index 0).
    pub fn default_spawn(&self) -> (f64, f64) {
        self.rooms[0].spawn
    }
}
