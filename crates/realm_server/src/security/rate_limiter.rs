//! Rate limiting implementation using token bucket algorithm.
//!
//! Buckets are keyed by `(user, event kind)` so one chatty event class
//! cannot starve another, and one user cannot starve the rest.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::RateLimitConfig;
use crate::protocol::EventKind;
use crate::types::PlayerId;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Quota {
    capacity: f64,
    refill_per_sec: f64,
}

/// Token bucket rate limiter for controlling per-user event rates.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<(PlayerId, EventKind), TokenBucket>>,
    config: RateLimitConfig,
    blocked_count: std::sync::atomic::AtomicU64,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given quotas.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            config,
            blocked_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Checks whether an event from the given user should be allowed.
    ///
    /// Event kinds without a configured quota are always allowed.
    pub async fn check(&self, user_id: PlayerId, kind: EventKind) -> bool {
        let Some(quota) = self.quota(kind) else {
            return true;
        };

        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        let bucket = buckets.entry((user_id, kind)).or_insert(TokenBucket {
            tokens: quota.capacity,
            last_refill: now,
        });

        // Refill tokens based on elapsed time
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * quota.refill_per_sec).min(quota.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            self.blocked_count
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            false
        }
    }

    /// Gets the total number of blocked events.
    pub fn blocked_count(&self) -> u64 {
        self.blocked_count
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Drops buckets that have been idle long enough to be full again.
    pub async fn cleanup_old_entries(&self) {
        let mut buckets = self.buckets.write().await;
        let cutoff = Instant::now() - Duration::from_secs(3600); // 1 hour
        buckets.retain(|_, bucket| bucket.last_refill > cutoff);
    }

    fn quota(&self, kind: EventKind) -> Option<Quota> {
        let limits = &self.config;
        match kind {
            EventKind::MovePlayer => Some(Quota {
                capacity: limits.move_per_sec as f64,
                refill_per_sec: limits.move_per_sec as f64,
            }),
            EventKind::Teleport => Some(Quota {
                capacity: limits.teleport_per_sec as f64,
                refill_per_sec: limits.teleport_per_sec as f64,
            }),
            EventKind::ChangedSkin => Some(Quota {
                capacity: limits.skin_per_sec as f64,
                refill_per_sec: limits.skin_per_sec as f64,
            }),
            EventKind::SendMessage => Some(Quota {
                capacity: limits.chat_per_min as f64,
                refill_per_sec: limits.chat_per_min as f64 / 60.0,
            }),
            EventKind::JoinRealm => Some(Quota {
                capacity: limits.join_per_min as f64,
                refill_per_sec: limits.join_per_min as f64 / 60.0,
            }),
            EventKind::KickPlayer => None,
        }
    }
}
