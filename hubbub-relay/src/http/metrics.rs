//! Prometheus metrics endpoint.

use crate::server::ChatRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since
/// startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<ChatRelay>>) -> impl IntoResponse {
    let m = relay.metrics();

    // Gauges — current state
    let online = relay.online_count();

    // Counters — monotonic since startup
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let broadcasts = m.broadcasts_total.load(Ordering::Relaxed);
    let privates = m.privates_total.load(Ordering::Relaxed);
    let transfers = m.transfers_total.load(Ordering::Relaxed);
    let rejected = m.transfers_rejected.load(Ordering::Relaxed);
    let failed = m.transfers_failed.load(Ordering::Relaxed);
    let file_bytes = m.file_bytes_relayed.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP hubbub_relay_connections_online Number of authenticated connections
# TYPE hubbub_relay_connections_online gauge
hubbub_relay_connections_online {online}

# HELP hubbub_relay_info Server information
# TYPE hubbub_relay_info gauge
hubbub_relay_info{{version="{version}"}} 1

# HELP hubbub_relay_connections_total Total connections accepted
# TYPE hubbub_relay_connections_total counter
hubbub_relay_connections_total {conns_total}

# HELP hubbub_relay_broadcasts_total Total broadcast lines relayed
# TYPE hubbub_relay_broadcasts_total counter
hubbub_relay_broadcasts_total {broadcasts}

# HELP hubbub_relay_private_messages_total Total private messages relayed
# TYPE hubbub_relay_private_messages_total counter
hubbub_relay_private_messages_total {privates}

# HELP hubbub_relay_transfers_completed_total Total file transfers completed
# TYPE hubbub_relay_transfers_completed_total counter
hubbub_relay_transfers_completed_total {transfers}

# HELP hubbub_relay_transfers_rejected_total Total file transfers rejected
# TYPE hubbub_relay_transfers_rejected_total counter
hubbub_relay_transfers_rejected_total {rejected}

# HELP hubbub_relay_transfers_failed_total Total file transfers failed
# TYPE hubbub_relay_transfers_failed_total counter
hubbub_relay_transfers_failed_total {failed}

# HELP hubbub_relay_file_bytes_relayed_total Total file bytes relayed
# TYPE hubbub_relay_file_bytes_relayed_total counter
hubbub_relay_file_bytes_relayed_total {file_bytes}

# HELP hubbub_relay_rate_limit_hits_total Total rate limit rejections
# TYPE hubbub_relay_rate_limit_hits_total counter
hubbub_relay_rate_limit_hits_total {rate_limits}

# HELP hubbub_relay_errors_total Total protocol errors
# TYPE hubbub_relay_errors_total counter
hubbub_relay_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
