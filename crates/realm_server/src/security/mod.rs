//! Security module: rate limiting, connection caps and message hygiene.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::SecurityConfig;
use crate::protocol::EventKind;
use crate::types::PlayerId;

pub mod rate_limiter;

pub use rate_limiter::RateLimiter;

/// Central security manager for the realm server.
#[derive(Debug)]
pub struct SecurityManager {
    config: SecurityConfig,
    rate_limiter: RateLimiter,
    connection_tracker: RwLock<HashMap<IpAddr, ConnectionInfo>>,
}

#[derive(Debug, Clone)]
struct ConnectionInfo {
    count: u32,
    last_seen: Instant,
}

impl SecurityManager {
    /// Creates a new security manager with the given configuration.
    pub fn new(config: SecurityConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limits.clone());
        Self {
            config,
            rate_limiter,
            connection_tracker: RwLock::new(HashMap::new()),
        }
    }

    /// Validates an incoming connection attempt against the ban list and
    /// the per-IP connection cap, and records it on success.
    pub async fn validate_connection(&self, ip: IpAddr) -> Result<(), SecurityError> {
        if self.config.banned_ips.contains(&ip) {
            return Err(SecurityError::BannedIp(ip));
        }

        let mut tracker = self.connection_tracker.write().await;
        let info = tracker.entry(ip).or_insert(ConnectionInfo {
            count: 0,
            last_seen: Instant::now(),
        });

        if info.count >= self.config.max_connections_per_ip {
            return Err(SecurityError::TooManyConnections(ip));
        }

        info.count += 1;
        info.last_seen = Instant::now();
        Ok(())
    }

    /// Checks an inbound frame's size before any parsing happens.
    pub fn validate_message_size(&self, len: usize) -> Result<(), SecurityError> {
        if len > self.config.max_message_size {
            return Err(SecurityError::MessageTooLarge(len));
        }
        Ok(())
    }

    /// Applies the per-`(user, event)` rate limit.
    pub async fn check_rate_limit(&self, user_id: PlayerId, kind: EventKind) -> bool {
        if !self.config.enable_rate_limiting {
            return true;
        }
        self.rate_limiter.check(user_id, kind).await
    }

    /// Registers a connection disconnect.
    pub async fn on_disconnect(&self, ip: IpAddr) {
        let mut tracker = self.connection_tracker.write().await;
        if let Some(info) = tracker.get_mut(&ip) {
            info.count = info.count.saturating_sub(1);
            if info.count == 0 {
                tracker.remove(&ip);
            }
        }
    }

    /// Cleans up stale connection tracking and idle rate-limit buckets.
    pub async fn cleanup_stale_entries(&self) {
        {
            let mut tracker = self.connection_tracker.write().await;
            let cutoff = Instant::now() - Duration::from_secs(300); // 5 minutes
            tracker.retain(|_, info| info.count > 0 || info.last_seen > cutoff);
        }
        self.rate_limiter.cleanup_old_entries().await;
    }

    /// Gets current security statistics.
    pub async fn stats(&self) -> SecurityStats {
        SecurityStats {
            tracked_ips: self.connection_tracker.read().await.len(),
            rate_limited_events: self.rate_limiter.blocked_count(),
            banned_ips: self.config.banned_ips.len(),
        }
    }
}

/// Security-related statistics.
#[derive(Debug, Clone)]
pub struct SecurityStats {
    pub tracked_ips: usize,
    pub rate_limited_events: u64,
    pub banned_ips: usize,
}

/// Security-related errors.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("IP address {0} is banned")]
    BannedIp(IpAddr),

    #[error("Too many connections from IP {0}")]
    TooManyConnections(IpAddr),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[tokio::test]
    async fn per_ip_connection_cap() {
        let config = SecurityConfig {
            max_connections_per_ip: 2,
            ..SecurityConfig::default()
        };
        let security = SecurityManager::new(config);

        assert!(security.validate_connection(ip()).await.is_ok());
        assert!(security.validate_connection(ip()).await.is_ok());
        assert!(matches!(
            security.validate_connection(ip()).await,
            Err(SecurityError::TooManyConnections(_))
        ));

        // A disconnect frees a slot.
        security.on_disconnect(ip()).await;
        assert!(security.validate_connection(ip()).await.is_ok());
    }

    #[tokio::test]
    async fn banned_ips_are_rejected() {
        let config = SecurityConfig {
            banned_ips: vec![ip()],
            ..SecurityConfig::default()
        };
        let security = SecurityManager::new(config);
        assert!(matches!(
            security.validate_connection(ip()).await,
            Err(SecurityError::BannedIp(_))
        ));
    }

    #[tokio::test]
    async fn message_size_ceiling() {
        let security = SecurityManager::new(SecurityConfig::default());
        assert!(security.validate_message_size(1024).is_ok());
        assert!(matches!(
            security.validate_message_size(65 * 1024),
            Err(SecurityError::MessageTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn rate_limiting_can_be_disabled() {
        let config = SecurityConfig {
            enable_rate_limiting: false,
            ..SecurityConfig::default()
        };
        let security = SecurityManager::new(config);
        let user = PlayerId::new();
        for _ in 0..100 {
            assert!(security.check_rate_limit(user, EventKind::JoinRealm).await);
        }
    }
}
