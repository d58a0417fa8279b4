//! Connection management for client sockets.
//!
//! This module tracks the lifecycle of client connections: registration,
//! user binding after handshake authentication, per-socket outbound
//! queueing, and forced closes.

pub mod client;
pub mod manager;

pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
///
/// Connection ids uniquely identify client sockets throughout their
/// lifecycle on the server.
pub type ConnectionId = usize;
