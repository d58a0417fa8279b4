//! Connection handling logic for WebSocket clients.
//!
//! This module manages the lifecycle of individual client connections:
//! WebSocket handshake with credential capture, handshake-time
//! authentication against the identity provider, the per-connection read
//! loop, and cleanup when the connection ends.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use futures_util::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::dispatch::{self, ServerContext};
use crate::error::ServerError;
use crate::protocol::{ErrorCode, ServerEvent};
use crate::types::PlayerId;

/// Credentials attached to the WebSocket upgrade request.
#[derive(Debug, Default, Clone)]
struct HandshakeCredentials {
    token: Option<String>,
    uid: Option<String>,
}

impl HandshakeCredentials {
    /// Extracts `token` and `uid` from the upgrade request's query string.
    fn from_query(query: Option<&str>) -> Self {
        let mut credentials = Self::default();
        let Some(query) = query else {
            return credentials;
        };
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("token", value)) if !value.is_empty() => {
                    credentials.token = Some(value.to_string());
                }
                Some(("uid", value)) if !value.is_empty() => {
                    credentials.uid = Some(value.to_string());
                }
                _ => {}
            }
        }
        credentials
    }
}

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Enforce the per-IP connection cap and the global connection ceiling
/// 2. Perform the WebSocket handshake, capturing handshake credentials
/// 3. Verify the bearer token against the claimed user id
/// 4. Register the connection and bind the authenticated user to it
/// 5. Run the read loop, dispatching each frame in arrival order
/// 6. On any exit, run the disconnect path (session leave, broadcasts)
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ServerContext,
    max_connections: usize,
    idle_timeout: Duration,
) -> Result<(), ServerError> {
    if ctx.connections.count().await >= max_connections {
        warn!("🚦 Connection ceiling reached, refusing {addr}");
        return Ok(());
    }
    if let Err(e) = ctx.security.validate_connection(addr.ip()).await {
        debug!("🚫 Refusing connection from {addr}: {e}");
        return Ok(());
    }

    let mut credentials = HandshakeCredentials::default();
    let ws_stream = match accept_hdr_async(stream, |req: &Request, resp: Response| {
        credentials = HandshakeCredentials::from_query(req.uri().query());
        Ok(resp)
    })
    .await
    {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            ctx.security.on_disconnect(addr.ip()).await;
            return Err(ServerError::Network(format!(
                "WebSocket handshake failed: {e}"
            )));
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Authenticate once at the handshake; the user id becomes the
    // connection's implicit identity for every later frame.
    let verified = match (&credentials.token, &credentials.uid) {
        (Some(token), Some(uid)) => match PlayerId::parse(uid) {
            Ok(claimed) => ctx
                .directory
                .identity
                .verify(token, claimed)
                .await
                .map(|principal| (claimed, principal)),
            Err(_) => None,
        },
        _ => None,
    };

    let Some((user_id, principal)) = verified else {
        debug!("🔐 Rejecting unauthenticated connection from {addr}");
        reject_unauthenticated(&mut ws_sender).await;
        ctx.security.on_disconnect(addr.ip()).await;
        return Ok(());
    };

    let (sender, receiver) = mpsc::unbounded_channel::<Message>();
    let connection_id = ctx.connections.register(addr, sender.clone()).await;
    ctx.connections.bind_user(connection_id, user_id).await;
    ctx.registry
        .insert(user_id, principal.clone(), connection_id)
        .await;
    info!(
        "🔐 Connection {connection_id} authenticated as {} ({user_id})",
        principal.username
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, receiver));

    // Read loop: frames of one connection are processed in arrival order.
    loop {
        match timeout(idle_timeout, ws_receiver.next()).await {
            Err(_) => {
                info!("⏰ Connection {connection_id} idle for {idle_timeout:?}, closing");
                break;
            }
            Ok(None) => {
                trace!("🔌 Connection {connection_id} stream ended");
                break;
            }
            Ok(Some(Ok(message))) => match message {
                Message::Text(text) => {
                    dispatch::handle_frame(&ctx, connection_id, user_id, &text).await;
                }
                Message::Ping(data) => {
                    let _ = sender.send(Message::Pong(data));
                }
                Message::Close(_) => {
                    debug!("🔌 Client {connection_id} requested close");
                    break;
                }
                _ => {}
            },
            Ok(Some(Err(e))) => {
                error!("WebSocket error for connection {connection_id}: {e}");
                break;
            }
        }
    }

    dispatch::disconnect(&ctx, connection_id).await;
    writer_handle.abort();
    Ok(())
}

/// Writer task: drains a connection's outbound queue into the socket.
///
/// A single writer per socket is what serializes outbound message order.
/// The task stops after forwarding a close frame, which completes the
/// closing handshake and tears the stream down.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut receiver: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = receiver.recv().await {
        let closing = matches!(message, Message::Close(_));
        if ws_sender.send(message).await.is_err() {
            break;
        }
        if closing {
            break;
        }
    }
}

async fn reject_unauthenticated(
    ws_sender: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
) {
    let event = ServerEvent::Error {
        event: "handshake".to_string(),
        code: ErrorCode::AuthError,
        message: "Authentication failed".to_string(),
    };
    let _ = ws_sender.send(Message::Text(event.encode().into())).await;
    let _ = ws_sender.send(Message::Close(None)).await;
}
