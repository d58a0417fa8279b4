//! Core realm server implementation.
//!
//! `RealmServer` wires the subsystems together (session manager, connection
//! manager, user registry, security, dispatcher) and runs the accept loop.
//! It also exposes the entry points the embedding process consumes: kick,
//! realm eviction, and statistics.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::connection::ConnectionManager;
use crate::directory::Directory;
use crate::dispatch::{self, JoinGate, ServerContext};
use crate::error::ServerError;
use crate::protocol::{ServerEvent, TerminationCode};
use crate::registry::UserRegistry;
use crate::security::SecurityManager;
use crate::server::handlers::handle_connection;
use crate::session::SessionManager;
use crate::types::{PlayerId, RealmId};

/// Point-in-time server statistics.
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub connections: usize,
    pub sessions: usize,
    pub players: usize,
    pub authenticated_users: usize,
    pub rate_limited_events: u64,
}

/// The core realm coordination server.
///
/// Owns all in-memory state and the accept loop. The embedding process
/// provides the external collaborators (identity provider, realm store)
/// through a [`Directory`].
pub struct RealmServer {
    config: ServerConfig,
    ctx: ServerContext,
    shutdown_sender: broadcast::Sender<()>,
}

impl RealmServer {
    /// Creates a new realm server with the specified configuration and
    /// external collaborators.
    pub fn new(config: ServerConfig, directory: Directory) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        let ctx = ServerContext {
            sessions: Arc::new(SessionManager::new()),
            connections: Arc::new(ConnectionManager::new()),
            registry: Arc::new(UserRegistry::new()),
            security: Arc::new(SecurityManager::new(config.security.clone())),
            directory,
            join_gate: JoinGate::new(),
        };
        Self {
            config,
            ctx,
            shutdown_sender,
        }
    }

    /// The shared dispatcher context. Exposed for the embedding process
    /// (HTTP surface) and for tests that drive the dispatcher directly.
    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Starts the server and begins accepting connections.
    ///
    /// Runs until [`RealmServer::shutdown`] is called, then delivers a
    /// terminal `sessionTerminated(SERVER_RESTART)` to every socket.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("🚀 Starting realm server on {}", self.config.bind_address);
        info!(
            "🧠 Detected {} CPU cores for the runtime",
            num_cpus::get()
        );

        let listener = tokio::net::TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind: {e}")))?;

        // Periodic cleanup of stale per-IP tracking and idle rate buckets.
        let cleanup_handle = {
            let security = self.ctx.security.clone();
            tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(300));
                loop {
                    ticker.tick().await;
                    security.cleanup_stale_entries().await;
                }
            })
        };

        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let max_connections = self.config.max_connections;
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let ctx = self.ctx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(
                                    stream,
                                    addr,
                                    ctx,
                                    max_connections,
                                    idle_timeout,
                                ).await {
                                    error!("Connection error: {e:?}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {e}");
                            break;
                        }
                    }
                }
                _ = shutdown_receiver.recv() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
            }
        }

        cleanup_handle.abort();

        let notified = self
            .ctx
            .connections
            .close_all_with(&ServerEvent::SessionTerminated {
                code: TerminationCode::ServerRestart,
                reason: "Server is shutting down.".to_string(),
            })
            .await;
        if notified > 0 {
            info!("📡 Notified {notified} socket(s) of shutdown");
        }

        info!("✅ Server stopped");
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
    }

    /// Forcibly removes a player, terminating its connection.
    ///
    /// This is the entry point the HTTP surface consumes for owner kicks.
    pub async fn kick_player(&self, user_id: PlayerId, reason: &str) {
        dispatch::kick_player(
            &self.ctx,
            user_id,
            &ServerEvent::SessionTerminated {
                code: TerminationCode::OwnerKicked,
                reason: reason.to_string(),
            },
        )
        .await;
    }

    /// Evicts every player of a realm and destroys its session.
    ///
    /// Called by the external notifier when the persisted realm record is
    /// modified (`REALM_UPDATED`) or deleted (`REALM_DELETED`).
    pub async fn evict_realm(&self, realm_id: RealmId, code: TerminationCode, reason: &str) {
        if !matches!(
            code,
            TerminationCode::RealmUpdated | TerminationCode::RealmDeleted
        ) {
            warn!("Eviction of {realm_id} with unexpected code {:?}", code);
        }
        dispatch::evict_realm(&self.ctx, realm_id, code, reason).await;
    }

    /// The realm a user is currently in, if any. Consumed by the HTTP
    /// surface for session lookups.
    pub async fn realm_of(&self, user_id: PlayerId) -> Option<RealmId> {
        self.ctx
            .sessions
            .session_of(user_id)
            .await
            .map(|session| session.realm().id)
    }

    /// Current server statistics.
    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            connections: self.ctx.connections.count().await,
            sessions: self.ctx.sessions.session_count().await,
            players: self.ctx.sessions.player_count().await,
            authenticated_users: self.ctx.registry.len().await,
            rate_limited_events: self.ctx.security.stats().await.rate_limited_events,
        }
    }
}
