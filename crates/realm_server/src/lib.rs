//! # Realm Server - Real-Time Coordination Core
//!
//! The authoritative coordination server for a multi-user virtual-space
//! application. Clients connect over a persistent WebSocket; each client is
//! a player inside a realm subdivided into rooms. The server tracks who is
//! where, relays movement and chat to the right room, and continuously
//! recomputes per-player proximity groups that drive peer-to-peer audio and
//! video pairing on the client side.
//!
//! ## Architecture Overview
//!
//! Three subsystems carry the core semantics:
//!
//! * **Session & room state** ([`session`]) - an in-memory model of
//!   realms → rooms → players with lifecycle rules guaranteeing at most one
//!   active session per realm and one live connection per user.
//! * **Event dispatcher** ([`dispatch`]) - the validated, authenticated
//!   message loop that mutates state and fans broadcasts out to the sockets
//!   of the affected room only.
//! * **Proximity engine** ([`proximity`]) - a derived index over player
//!   positions partitioning each room into equivalence classes; movement
//!   triggers incremental recomputation and notifications targeted at the
//!   players whose group changed.
//!
//! Around them sit the supporting layers: [`connection`] (socket registry
//! and per-socket outbound queues), [`protocol`] (wire envelope, payload
//! validation, outbound events), [`security`] (rate limits and connection
//! caps), [`realm`] (map parsing), [`registry`] (authenticated users) and
//! [`directory`] (interfaces to the identity provider and realm store).
//!
//! ## Message Flow
//!
//! 1. A connection is authenticated once at the WebSocket handshake,
//!    binding `(user id, socket id)` for its lifetime
//! 2. Each inbound frame is validated against its event schema
//! 3. The frame is resolved to the user's session and applied as a mutation
//! 4. Broadcasts go to a snapshot of room sockets captured under the
//!    session lock, through per-socket queues that preserve write order
//!
//! ## Concurrency Model
//!
//! One tokio task per connection, FIFO per connection. The session manager
//! registry sits behind a reader/writer lock; each session has its own
//! mutex; a dispatcher never holds two session locks at once. State
//! mutation never awaits network I/O: recipient sockets are snapshotted
//! under the lock and written to after release.

pub use config::{RateLimitConfig, SecurityConfig, ServerConfig};
pub use error::ServerError;
pub use server::{RealmServer, ServerStats};
pub use utils::{create_server, create_server_with_config, memory_directory};

pub mod config;
pub mod connection;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod proximity;
pub mod realm;
pub mod registry;
pub mod security;
pub mod server;
pub mod session;
pub mod types;
pub mod utils;

mod tests;
