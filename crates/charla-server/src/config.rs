//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the WebSocket/HTTP listener.
    /// Env: `WS_ADDR`
    /// Default: `0.0.0.0:8080`
    pub ws_addr: SocketAddr,

    /// Socket address for the TCP line-protocol RPC listener.
    /// Env: `RPC_ADDR`
    /// Default: `0.0.0.0:10001`
    pub rpc_addr: SocketAddr,

    /// Directory where per-chat history files are appended.
    /// Env: `HISTORY_DIR`
    /// Default: `./chat_history`
    pub history_dir: PathBuf,

    /// Whether chat history is written at all.
    /// Env: `HISTORY_ENABLED` (true/false)
    /// Default: `true`
    pub history_enabled: bool,

    /// Whether a stored message is also pushed back to its sender.
    /// Clients that render their own sends locally leave this off.
    /// Env: `ECHO_TO_SENDER` (true/false)
    /// Default: `false`
    pub echo_to_sender: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: ([0, 0, 0, 0], 8080).into(),
            rpc_addr: ([0, 0, 0, 0], 10001).into(),
            history_dir: PathBuf::from("./chat_history"),
            history_enabled: true,
            echo_to_sender: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("WS_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.ws_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid WS_ADDR, using default");
            }
        }

        if let Ok(addr) = std::env::var("RPC_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.rpc_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid RPC_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("HISTORY_DIR") {
            config.history_dir = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("HISTORY_ENABLED") {
            config.history_enabled = val != "false" && val != "0";
        }

        if let Ok(val) = std::env::var("ECHO_TO_SENDER") {
            config.echo_to_sender = val == "true" || val == "1";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so it is not stored here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.ws_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.rpc_addr, ([0, 0, 0, 0], 10001).into());
        assert!(config.history_enabled);
        assert!(!config.echo_to_sender);
    }

    #[test]
    fn test_history_dir_default() {
        let config = ServerConfig::default();
        assert_eq!(config.history_dir, PathBuf::from("./chat_history"));
    }
}
