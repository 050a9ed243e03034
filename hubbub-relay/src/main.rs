//! hubbub-relay binary entry point.
//!
//! Usage:
//! ```bash
//! hubbub-relay --config hubbub.toml
//! RUST_LOG=debug hubbub-relay
//! ```

use anyhow::Context;
use hubbub_relay::config::Config;
use hubbub_relay::http;
use hubbub_relay::limits;
use hubbub_relay::server::{self, ChatRelay};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = get_config_path();
    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        tracing::info!("no config file at {:?}, using defaults", config_path);
        Config::default()
    };

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;

    let relay = Arc::new(ChatRelay::new(config));

    http::health::init_start_time();
    if relay.config().http.enabled {
        let http_addr = relay.config().http.bind_address.clone();
        let http_listener = TcpListener::bind(&http_addr)
            .await
            .with_context(|| format!("failed to bind HTTP {http_addr}"))?;
        let app = http::build_router(relay.clone());
        tracing::info!("http endpoints on {}", http_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(http_listener, app).await {
                tracing::error!("http server error: {}", e);
            }
        });
    }

    let sweep_interval = relay.config().limits.sweep_interval_secs;
    limits::spawn_sweep_task(relay.rate_limits().clone(), sweep_interval);

    server::serve(relay, listener, shutdown_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        // Without a signal handler the only way out is the process being
        // killed; park forever rather than shutting down immediately.
        std::future::pending::<()>().await;
    }
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("hubbub.toml"))
}
