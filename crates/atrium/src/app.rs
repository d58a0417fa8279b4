//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates server
//! startup, monitoring, and graceful shutdown.

use std::sync::Arc;

use realm_server::{create_server_with_config, memory_directory, RealmServer};
use tracing::{error, info, warn};

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown, wait_for_shutdown_silent},
};

/// Main application struct.
///
/// Manages the complete lifecycle of the Atrium server: configuration
/// loading, server initialization, periodic statistics, and graceful
/// shutdown handling.
pub struct Application {
    config: AppConfig,
    server: Arc<RealmServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings, and
    /// initializes the realm server.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        // The development build runs against in-memory collaborators; a
        // production deployment wires the platform's identity provider and
        // realm store into the Directory here.
        let server_config = config.to_server_config()?;
        let server = Arc::new(create_server_with_config(server_config, memory_directory()));

        Ok(Self { config, server })
    }

    /// Runs the application until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("🌟 Starting Atrium Realm Server");
        self.log_configuration_summary();

        // Start server in background
        let server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                match server.start().await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {e:?}");
                        std::process::exit(1);
                    }
                }
            })
        };

        // Periodic statistics reporting
        let monitoring_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
                interval.tick().await; // skip the immediate first tick
                loop {
                    interval.tick().await;
                    let stats = server.stats().await;
                    info!(
                        "📊 System Health - {} connection(s) | {} session(s) | {} player(s) | {} rate-limited",
                        stats.connections, stats.sessions, stats.players, stats.rate_limited_events
                    );
                }
            })
        };

        info!("✅ Atrium Server is now running!");
        info!(
            "🎮 Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown().await?;

        // A second signal skips the graceful path.
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_silent().await {
                error!("Failed to set up second shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        monitoring_handle.abort();
        self.server.shutdown();

        info!("⏳ Waiting for server task to complete gracefully...");
        if let Err(e) =
            tokio::time::timeout(tokio::time::Duration::from_secs(8), server_handle).await
        {
            warn!("⏰ Server task did not complete within timeout: {e:?}");
        } else {
            info!("✅ Server task completed gracefully");
        }

        let stats = self.server.stats().await;
        info!("📊 Final Statistics:");
        info!("  - Open connections: {}", stats.connections);
        info!("  - Live sessions: {}", stats.sessions);
        info!("  - Rate-limited events: {}", stats.rate_limited_events);

        info!("✅ Atrium Server shutdown complete");
        info!("👋 Thank you for using Atrium!");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!(
            "  ⏱️ Idle timeout: {}s",
            self.config.server.idle_timeout_secs
        );
        info!(
            "  🚦 Per-IP connection cap: {}",
            self.config.server.max_connections_per_ip
        );
    }
}
