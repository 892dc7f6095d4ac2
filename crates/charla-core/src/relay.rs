use std::sync::Arc;

use tracing::debug;

use charla_shared::protocol::{ServerEvent, SignalKind};

use crate::notify::NotificationRegistry;

/// Forwards call-signaling payloads between two named peers.
///
/// Stateless: no call membership, no call lifecycle, no payload
/// inspection. The currently registered channels are the only state it
/// consults.
pub struct SignalingRelay {
    registry: Arc<NotificationRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<NotificationRegistry>) -> Self {
        Self { registry }
    }

    /// Forward one signal from `from` to `to`, payload verbatim.
    ///
    /// An offer that no live channel accepts, whether the target never
    /// registered or its channel died, bounces a `call-unavailable` notice
    /// to the caller, so the caller's UI can stop ringing. Answers,
    /// candidates, end and reject are dropped silently when the peer is
    /// gone; the call is already over for anyone who would care.
    pub fn forward(&self, kind: SignalKind, from: &str, to: &str, payload: serde_json::Value) {
        if self.registry.push(to, kind.into_event(from, payload)) {
            debug!(signal = %kind, %from, %to, "Relayed call signal");
        } else if kind == SignalKind::Offer {
            debug!(%from, %to, "Call target unreachable, bouncing offer");
            self.registry.push(
                from,
                ServerEvent::CallUnavailable {
                    reason: format!("{to} is not connected"),
                },
            );
        }
    }
}
