//! Rate limiting for hubbub-relay.
//!
//! Provides protection against connection flooding and message spam.
//!
//! Connections are limited per source IP address before a handler task is
//! even spawned; chat lines are limited per authenticated [`Identity`]; a
//! global limiter caps aggregate throughput across all clients. All three
//! use the governor crate's limiters, keyed ones backed by DashMap.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use hubbub_types::Identity;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits connection attempts per source IP.
    ///
    /// Configured via `limits.connections_per_ip`.
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,

    /// Limits chat lines per identity.
    ///
    /// Configured via `limits.messages_per_minute`.
    message_limiter: Arc<KeyedLimiter<Identity>>,

    /// Global rate limiter across all clients.
    ///
    /// Prevents aggregate overload even if individual clients are within
    /// limits.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_limiter", &"KeyedLimiter<IpAddr>")
            .field("message_limiter", &"KeyedLimiter<Identity>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configured values are zero.
    pub fn new(config: &LimitsConfig) -> Self {
        let connections_per_minute = NonZeroU32::new(config.connections_per_ip)
            .expect("connections_per_ip must be > 0");
        let connection_quota = Quota::per_minute(connections_per_minute);

        let messages_per_minute =
            NonZeroU32::new(config.messages_per_minute).expect("messages_per_minute must be > 0");
        let message_quota = Quota::per_minute(messages_per_minute);

        let global_rps = NonZeroU32::new(config.global_requests_per_second)
            .expect("global_requests_per_second must be > 0");
        let global_quota = Quota::per_second(global_rps);

        Self {
            connection_limiter: Arc::new(RateLimiter::keyed(connection_quota)),
            message_limiter: Arc::new(RateLimiter::keyed(message_quota)),
            global_limiter: Arc::new(RateLimiter::direct(global_quota)),
        }
    }

    /// Check if a connection attempt from this address is allowed.
    pub fn check_connection(&self, addr: IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(&addr)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if a chat line from this identity is allowed.
    pub fn check_message(&self, identity: &Identity) -> Result<(), RateLimitError> {
        self.message_limiter
            .check_key(identity)
            .map_err(|_| RateLimitError::MessageLimitExceeded)
    }

    /// Check if the global request rate is within limits.
    ///
    /// This is a server-wide rate limit that caps aggregate throughput
    /// regardless of individual client limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Get the number of tracked connection keys (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Get the number of tracked message keys (for metrics).
    pub fn message_keys_count(&self) -> usize {
        self.message_limiter.len()
    }

    /// Evict stale entries from the keyed rate limiter DashMaps.
    ///
    /// Over time, disconnected clients leave entries in the DashMap.
    /// `retain_recent()` removes entries whose rate limit cells have fully
    /// recharged (i.e., idle clients). Called periodically from the sweep
    /// task.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.message_limiter.retain_recent();
    }
}

/// Spawn a background task that periodically evicts stale limiter entries.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweep_task(limits: RateLimits, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("limiter sweep task started (interval: {}s)", interval_secs);
        let mut timer = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick fires immediately; skip it so the initial sweep
        // happens one interval in.
        timer.tick().await;

        loop {
            timer.tick().await;
            let before = limits.connection_keys_count() + limits.message_keys_count();
            limits.shrink();
            let after = limits.connection_keys_count() + limits.message_keys_count();
            if before > after {
                tracing::debug!("limiter sweep evicted {} stale entries", before - after);
            }
        }
    })
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many connection attempts from this address.
    ConnectionLimitExceeded,
    /// Too many messages from this identity.
    MessageLimitExceeded,
    /// Global request rate exceeded across all clients.
    GlobalLimitExceeded,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLimitExceeded => {
                write!(f, "connection rate limit exceeded")
            }
            Self::MessageLimitExceeded => {
                write!(f, "message rate limit exceeded")
            }
            Self::GlobalLimitExceeded => {
                write!(f, "global rate limit exceeded")
            }
        }
    }
}

impl std::error::Error for RateLimitError {}
