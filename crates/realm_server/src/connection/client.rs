//! Individual client connection representation.

use std::net::SocketAddr;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::types::PlayerId;

/// Sender half of a connection's outbound queue.
///
/// All writes to a socket go through this queue and are drained by a single
/// writer task, which is what serializes per-socket message order.
pub type OutboundSender = mpsc::UnboundedSender<Message>;

/// State tracked for one connected client socket.
#[derive(Debug)]
pub struct ClientConnection {
    /// The authenticated user bound to this connection (None until the
    /// handshake completes).
    pub user_id: Option<PlayerId>,

    /// The remote network address of the client.
    pub remote_addr: SocketAddr,

    /// When this connection was established.
    pub connected_at: SystemTime,

    /// Outbound message queue feeding the connection's writer task.
    pub sender: OutboundSender,
}

impl ClientConnection {
    /// Creates a new unauthenticated connection record.
    pub fn new(remote_addr: SocketAddr, sender: OutboundSender) -> Self {
        Self {
            user_id: None,
            remote_addr,
            connected_at: SystemTime::now(),
            sender,
        }
    }
}
