//! Core identifier types shared across the server.
//!
//! Wrapper types keep the various UUID-keyed namespaces from being mixed up:
//! a [`PlayerId`] can never be passed where a [`RealmId`] is expected, and
//! both serialize as plain UUID strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an authenticated user / player.
///
/// A wrapper around UUID providing type safety so player ids cannot be
/// confused with realm ids elsewhere in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a player ID from its string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a realm (a persistent virtual space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RealmId(pub Uuid);

impl RealmId {
    /// Creates a new random realm ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a realm ID from its string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for RealmId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for RealmId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RealmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proximity group assignment for one player within a room.
///
/// Two players carry the same `Grouped` id iff they are transitively within
/// the proximity radius of each other. A solo player has no peer and is
/// `Solo`. The group id is the lexicographically smallest user id in the
/// component, so every member derives the same id independently and a
/// reconnecting client re-observes the id it had before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProximityId {
    /// No peer within transitive proximity range.
    Solo,
    /// Member of the group represented by the given player id.
    Grouped(PlayerId),
}

impl ProximityId {
    /// Wire representation: the representative's UUID, or `"none"`.
    pub fn as_wire(&self) -> String {
        match self {
            ProximityId::Solo => "none".to_string(),
            ProximityId::Grouped(id) => id.to_string(),
        }
    }
}

impl std::fmt::Display for ProximityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}
