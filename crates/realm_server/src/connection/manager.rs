//! Connection manager: socket registry and outbound fan-out.
//!
//! The `ConnectionManager` assigns connection ids, stores each socket's
//! outbound queue, and delivers encoded events to one or many sockets.
//! Sends enqueue onto the target's per-socket queue and never block on the
//! network, so a slow socket cannot stall a dispatcher holding no locks at
//! all by the time fan-out happens.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace};

use super::client::{ClientConnection, OutboundSender};
use super::ConnectionId;
use crate::protocol::ServerEvent;
use crate::types::PlayerId;

/// Central registry of live client sockets.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: Arc<RwLock<HashMap<ConnectionId, ClientConnection>>>,
    next_id: AtomicUsize,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Registers a new connection and returns its unique id.
    pub async fn register(&self, remote_addr: SocketAddr, sender: OutboundSender) -> ConnectionId {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, ClientConnection::new(remote_addr, sender));
        info!("🔗 Connection {} from {}", connection_id, remote_addr);
        connection_id
    }

    /// Binds an authenticated user to a connection.
    pub async fn bind_user(&self, connection_id: ConnectionId, user_id: PlayerId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&connection_id) {
            connection.user_id = Some(user_id);
        }
    }

    /// The user bound to a connection, if authenticated.
    pub async fn user_of(&self, connection_id: ConnectionId) -> Option<PlayerId> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).and_then(|c| c.user_id)
    }

    /// The remote address of a connection.
    pub async fn remote_addr(&self, connection_id: ConnectionId) -> Option<SocketAddr> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).map(|c| c.remote_addr)
    }

    /// Queues an event for a single socket.
    ///
    /// A send to a socket whose writer already died is quietly dropped; the
    /// connection's own cleanup path handles removal.
    pub async fn send(&self, connection_id: ConnectionId, event: &ServerEvent) {
        let connections = self.connections.read().await;
        if let Some(connection) = connections.get(&connection_id) {
            let _ = connection
                .sender
                .send(Message::Text(event.encode().into()));
        } else {
            trace!(
                "📭 Dropping '{}' for unknown connection {}",
                event.name(),
                connection_id
            );
        }
    }

    /// Queues an event for every socket in the list.
    pub async fn send_to_all(&self, connection_ids: &[ConnectionId], event: &ServerEvent) {
        if connection_ids.is_empty() {
            return;
        }
        let connections = self.connections.read().await;
        let text = event.encode();
        for connection_id in connection_ids {
            if let Some(connection) = connections.get(connection_id) {
                let _ = connection
                    .sender
                    .send(Message::Text(text.clone().into()));
            }
        }
        trace!(
            "📡 Queued '{}' for {} socket(s)",
            event.name(),
            connection_ids.len()
        );
    }

    /// Delivers a terminal event and then a close frame to a socket.
    ///
    /// The writer task forwards both in order and shuts down after the
    /// close frame, which tears the TCP stream down.
    pub async fn close_with(&self, connection_id: ConnectionId, event: &ServerEvent) {
        let connections = self.connections.read().await;
        if let Some(connection) = connections.get(&connection_id) {
            let _ = connection
                .sender
                .send(Message::Text(event.encode().into()));
            let _ = connection.sender.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: event.name().to_string().into(),
            })));
            debug!(
                "🔌 Closing connection {} with terminal '{}'",
                connection_id,
                event.name()
            );
        }
    }

    /// Delivers a terminal event and close frame to every live socket.
    /// Used on server shutdown.
    pub async fn close_all_with(&self, event: &ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let text = event.encode();
        for connection in connections.values() {
            let _ = connection
                .sender
                .send(Message::Text(text.clone().into()));
            let _ = connection.sender.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: event.name().to_string().into(),
            })));
        }
        connections.len()
    }

    /// Removes a connection from the registry, returning its remote address
    /// so callers can release per-address accounting.
    pub async fn remove(&self, connection_id: ConnectionId) -> Option<SocketAddr> {
        let mut connections = self.connections.write().await;
        connections.remove(&connection_id).map(|connection| {
            info!(
                "❌ Connection {} from {} disconnected",
                connection_id, connection.remote_addr
            );
            connection.remote_addr
        })
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}
