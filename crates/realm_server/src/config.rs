//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default
//! values used to initialize and customize server behavior.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Configuration structure for the realm server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Seconds of silence after which a connection is force-closed
    pub idle_timeout_secs: u64,

    /// Security configuration settings
    pub security: SecurityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().expect("Invalid default bind address"),
            max_connections: 1000,
            idle_timeout_secs: 30 * 60,
            security: SecurityConfig::default(),
        }
    }
}

/// Security configuration for input validation and protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Enable per-event rate limiting
    pub enable_rate_limiting: bool,

    /// Per-event rate limit quotas
    pub rate_limits: RateLimitConfig,

    /// Maximum message size in bytes
    pub max_message_size: usize,

    /// Maximum concurrent connections per source IP
    pub max_connections_per_ip: u32,

    /// Banned IP addresses
    pub banned_ips: Vec<IpAddr>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            rate_limits: RateLimitConfig::default(),
            max_message_size: 64 * 1024, // 64KB
            max_connections_per_ip: 10,
            banned_ips: Vec::new(),
        }
    }
}

/// Token-bucket quotas per `(user, event)` pair.
///
/// Each quota is expressed as `burst` events refilling at `per minute`
/// granularity; see `security::rate_limiter` for the bucket mechanics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// movePlayer events per second
    pub move_per_sec: u32,
    /// teleport events per second
    pub teleport_per_sec: u32,
    /// changedSkin events per second
    pub skin_per_sec: u32,
    /// sendMessage events per minute
    pub chat_per_min: u32,
    /// joinRealm events per minute
    pub join_per_min: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            move_per_sec: 60,
            teleport_per_sec: 2,
            skin_per_sec: 1,
            chat_per_min: 10,
            join_per_min: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_quotas() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.idle_timeout_secs, 1800);
        assert_eq!(config.security.max_connections_per_ip, 10);
        assert_eq!(config.security.rate_limits.move_per_sec, 60);
        assert_eq!(config.security.rate_limits.teleport_per_sec, 2);
        assert_eq!(config.security.rate_limits.skin_per_sec, 1);
        assert_eq!(config.security.rate_limits.chat_per_min, 10);
        assert_eq!(config.security.rate_limits.join_per_min, 5);
    }
}
