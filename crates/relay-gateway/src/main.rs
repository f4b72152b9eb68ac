//! # relay-gateway
//!
//! Standalone relay endpoint: every inbound envelope is fanned back out to
//! all connected subscribers.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::{RelayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Relay transport gateway.
#[derive(Parser, Debug)]
#[command(name = "relay-gateway", about = "Relay transport gateway")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "9092")]
    port: u16,

    /// URL path serving the WebSocket upgrade.
    #[arg(long, default_value = "/ws")]
    ws_path: String,

    /// Liveness probe interval in milliseconds.
    #[arg(long, default_value = "30000")]
    heartbeat_interval_ms: u64,

    /// Maximum concurrent connections (0 = unlimited).
    #[arg(long, default_value = "0")]
    max_connections: usize,

    /// Exact-match allowed origin; repeat the flag for several. Absent
    /// accepts any origin.
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    let config = ServerConfig {
        host: args.host,
        port: Some(args.port),
        path: args.ws_path,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        max_connections: args.max_connections,
        allowed_origins: (!args.allow_origins.is_empty()).then_some(args.allow_origins),
        ..ServerConfig::default()
    };

    let server = RelayServer::new(config);
    let registry = server.registry().clone();
    let server = server.on_message(move |conn_id, envelope| {
        tracing::debug!(%conn_id, event_type = %envelope.event_type, "relaying envelope");
        let _ = registry.broadcast(&envelope);
    });

    let handle = server.serve().await.context("failed to start relay server")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
