//! # charla-server
//!
//! Hub server for the charla messaging network.
//!
//! This binary provides:
//! - **In-memory chat engine** (users, groups, per-chat message logs)
//! - **WebSocket endpoint** (axum) for live notifications and WebRTC call
//!   signaling relay
//! - **TCP line protocol** for request/response operations with
//!   server-pushed event lines on the same connection
//! - **Plain-text history files**, one per chat, written off the hot path

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use charla_core::{ChatCore, NotificationRegistry, SignalingRelay};
use charla_server::config::ServerConfig;
use charla_server::history::FileHistory;
use charla_server::state::AppState;
use charla_server::{rpc, ws};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,charla_server=debug")),
        )
        .init();

    info!("Starting charla server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let registry = Arc::new(NotificationRegistry::new());
    let relay = Arc::new(SignalingRelay::new(registry.clone()));

    let mut core = ChatCore::new(registry.clone()).with_echo_to_sender(config.echo_to_sender);
    if config.history_enabled {
        // History writer (creates the directory if missing)
        let history = FileHistory::new(config.history_dir.clone()).await?;
        core = core.with_history(Arc::new(history));
    }

    let state = AppState {
        core: Arc::new(core),
        registry,
        relay,
    };

    // -----------------------------------------------------------------------
    // 4. Spawn the RPC listener (runs in background tokio task)
    // -----------------------------------------------------------------------
    let rpc_state = state.clone();
    let rpc_addr = config.rpc_addr;
    tokio::spawn(async move {
        if let Err(e) = rpc::serve(rpc_state, rpc_addr).await {
            tracing::error!(error = %e, "RPC listener failed");
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the WS server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = ws::serve(state, config.ws_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "WebSocket server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
