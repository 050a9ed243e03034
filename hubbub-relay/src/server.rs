//! Main relay server state and accept loop.
//!
//! [`ChatRelay`] owns the registry, limits, and metrics; [`serve`] accepts
//! connections and hands each one to a router task.

use crate::config::Config;
use crate::limits::RateLimits;
use crate::registry::Registry;
use crate::router;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64` — no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections accepted (before authentication).
    pub connections_total: AtomicU64,
    /// Total broadcast lines relayed.
    pub broadcasts_total: AtomicU64,
    /// Total private messages relayed.
    pub privates_total: AtomicU64,
    /// Total file transfers completed.
    pub transfers_total: AtomicU64,
    /// Total file transfers rejected (declined or offer timed out).
    pub transfers_rejected: AtomicU64,
    /// Total file transfers failed mid-flight.
    pub transfers_failed: AtomicU64,
    /// Total file bytes relayed (counted once per chunk forwarded).
    pub file_bytes_relayed: AtomicU64,
    /// Total rate limit rejections (connection + message + global).
    pub rate_limit_hits: AtomicU64,
    /// Total protocol errors (invalid frames, auth failures, etc.).
    pub errors_total: AtomicU64,
}

/// Main relay server.
///
/// Owns the connection registry for its whole lifetime and is shared with
/// every router task through an `Arc`.
pub struct ChatRelay {
    config: Config,
    registry: Registry,
    /// Rate limiters for connections and messages.
    rate_limits: RateLimits,
    /// Operational metrics (counters).
    metrics: RelayMetrics,
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("online", &self.registry.online_count())
            .finish_non_exhaustive()
    }
}

impl ChatRelay {
    /// Create a new relay with the given config.
    pub fn new(config: Config) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        Self {
            config,
            registry: Registry::new(),
            rate_limits,
            metrics: RelayMetrics::default(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Number of authenticated connections currently online.
    pub fn online_count(&self) -> usize {
        self.registry.online_count()
    }
}

/// Accept connections until `shutdown` resolves, then drain.
///
/// Every connection handler runs as an owned task in a [`JoinSet`]; on
/// shutdown the listener stops accepting and live handlers (including any
/// in-flight file transfer) get `server.shutdown_grace_secs` to reach a
/// terminal state before being aborted.
pub async fn serve(
    relay: Arc<ChatRelay>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!("listening on {}", local_addr);

    let mut handlers: JoinSet<()> = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        // Reap finished handlers so the set does not grow unbounded.
        while let Some(finished) = handlers.try_join_next() {
            if let Err(e) = finished {
                if e.is_panic() {
                    tracing::error!("connection task panicked: {}", e);
                }
            }
        }

        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("accept failed: {}", e);
                        continue;
                    }
                };

                // Per-IP flood protection before any task is spawned.
                if let Err(e) = relay.rate_limits().check_connection(peer_addr.ip()) {
                    tracing::warn!("connection rate limited for {}: {}", peer_addr, e);
                    relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                // Capacity cap counts unauthenticated handlers too.
                let max_connections = relay.config().limits.max_connections;
                if handlers.len() >= max_connections {
                    tracing::warn!(
                        "connection limit reached ({}/{}), rejecting {}",
                        handlers.len(),
                        max_connections,
                        peer_addr
                    );
                    continue;
                }

                relay.metrics().connections_total.fetch_add(1, Ordering::Relaxed);

                let relay = relay.clone();
                handlers.spawn(async move {
                    router::handle_connection(relay, stream, peer_addr).await;
                });
            }
        }
    }

    tracing::info!(
        "shutting down, draining {} connection task(s)",
        handlers.len()
    );

    let grace = Duration::from_secs(relay.config().server.shutdown_grace_secs);
    let drain = async {
        while handlers.join_next().await.is_some() {}
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        tracing::warn!("shutdown grace period elapsed, aborting remaining tasks");
        handlers.shutdown().await;
    }

    Ok(())
}
