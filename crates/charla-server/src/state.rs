use std::sync::Arc;

use charla_core::{ChatCore, NotificationRegistry, SignalingRelay};

/// Shared handles every transport works through.
///
/// The registry is held separately from the core so connection teardown
/// can do identity-conditional channel removal without going through a
/// chat operation.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<ChatCore>,
    pub registry: Arc<NotificationRegistry>,
    pub relay: Arc<SignalingRelay>,
}

impl AppState {
    /// Wire up an engine with no history sink and echo disabled. Tests and
    /// main build richer variants by hand.
    pub fn new() -> Self {
        let registry = Arc::new(NotificationRegistry::new());
        let relay = Arc::new(SignalingRelay::new(registry.clone()));
        let core = Arc::new(ChatCore::new(registry.clone()));
        Self {
            core,
            registry,
            relay,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
