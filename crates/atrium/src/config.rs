//! Configuration management for the Atrium server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments.

use realm_server::{RateLimitConfig, SecurityConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

fn default_max_connections() -> usize {
    1000
}

fn default_idle_timeout() -> u64 {
    30 * 60
}

fn default_max_connections_per_ip() -> u32 {
    10
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_true() -> bool {
    true
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Per-event rate limit quotas
    #[serde(default)]
    pub limits: LimitSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds of silence before a connection is force-closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections per source IP
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: u32,
    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Whether per-event rate limiting is enforced
    #[serde(default = "default_true")]
    pub enable_rate_limiting: bool,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// Per-event rate limit quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    pub move_per_sec: u32,
    pub teleport_per_sec: u32,
    pub skin_per_sec: u32,
    pub chat_per_min: u32,
    pub join_per_min: u32,
}

impl Default for LimitSettings {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            move_per_sec: defaults.move_per_sec,
            teleport_per_sec: defaults.teleport_per_sec,
            skin_per_sec: defaults.skin_per_sec,
            chat_per_min: defaults.chat_per_min,
            join_per_min: defaults.join_per_min,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
                idle_timeout_secs: default_idle_timeout(),
                max_connections_per_ip: default_max_connections_per_ip(),
                max_message_size: default_max_message_size(),
                enable_rate_limiting: true,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            limits: LimitSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a core server
    /// configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            idle_timeout_secs: self.server.idle_timeout_secs,
            security: SecurityConfig {
                enable_rate_limiting: self.server.enable_rate_limiting,
                rate_limits: RateLimitConfig {
                    move_per_sec: self.limits.move_per_sec,
                    teleport_per_sec: self.limits.teleport_per_sec,
                    skin_per_sec: self.limits.skin_per_sec,
                    chat_per_min: self.limits.chat_per_min,
                    join_per_min: self.limits.join_per_min,
                },
                max_message_size: self.server.max_message_size,
                max_connections_per_ip: self.server.max_connections_per_ip,
                banned_ips: Vec::new(),
            },
        })
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self
            .server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        if self.server.idle_timeout_secs == 0 {
            return Err("idle_timeout_secs must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
