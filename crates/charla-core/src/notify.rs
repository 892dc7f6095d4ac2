use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use charla_shared::error::DeliveryError;
use charla_shared::protocol::ServerEvent;

/// One live path to a connected user. Implementations hand the event to
/// the connection's writer task and return without blocking.
pub trait NotificationChannel: Send + Sync {
    fn push(&self, event: ServerEvent) -> Result<(), DeliveryError>;
}

/// user id -> the single live channel for that user.
///
/// A user attaches through exactly one connection at a time; registering
/// again replaces the previous channel, so the newest connection wins.
#[derive(Default)]
pub struct NotificationRegistry {
    channels: DashMap<String, Arc<dyn NotificationChannel>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn register(&self, user_id: &str, channel: Arc<dyn NotificationChannel>) {
        if self.channels.insert(user_id.to_string(), channel).is_some() {
            debug!(user = %user_id, "Replaced notification channel");
        }
    }

    /// Drop the user's channel whatever connection it belongs to.
    /// Idempotent.
    pub fn unregister(&self, user_id: &str) {
        self.channels.remove(user_id);
    }

    /// Drop the user's channel only if it is still `channel`. Disconnect
    /// cleanup of a stale connection must not evict a newer registration
    /// made by the user's replacement connection.
    pub fn unregister_channel(&self, user_id: &str, channel: &Arc<dyn NotificationChannel>) {
        self.channels
            .remove_if(user_id, |_, current| Arc::ptr_eq(current, channel));
    }

    pub fn is_registered(&self, user_id: &str) -> bool {
        self.channels.contains_key(user_id)
    }

    /// Best-effort push. Returns whether a live channel accepted the
    /// event, so callers that need a delivery receipt (the offer bounce
    /// in the relay) can tell a reachable peer from a gone one. A channel
    /// that reports its peer gone is removed so the next send does not
    /// retry it; the failure itself never reaches the operation that
    /// triggered the push.
    pub fn push(&self, user_id: &str, event: ServerEvent) -> bool {
        let Some(channel) = self
            .channels
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return false;
        };

        match channel.push(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Dropping dead notification channel");
                self.unregister_channel(user_id, &channel);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        events: Mutex<Vec<ServerEvent>>,
    }

    impl NotificationChannel for RecordingChannel {
        fn push(&self, event: ServerEvent) -> Result<(), DeliveryError> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    struct ClosedChannel;

    impl NotificationChannel for ClosedChannel {
        fn push(&self, _event: ServerEvent) -> Result<(), DeliveryError> {
            Err(DeliveryError::Closed)
        }
    }

    fn registered_event() -> ServerEvent {
        ServerEvent::Registered {
            user_id: "alice".into(),
        }
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = NotificationRegistry::new();
        let first = Arc::new(RecordingChannel::default());
        let second = Arc::new(RecordingChannel::default());

        registry.register("alice", first.clone());
        registry.register("alice", second.clone());
        assert!(registry.push("alice", registered_event()));

        assert_eq!(first.events.lock().len(), 0);
        assert_eq!(second.events.lock().len(), 1);
    }

    #[test]
    fn test_push_after_unregister_is_silent() {
        let registry = NotificationRegistry::new();
        let channel = Arc::new(RecordingChannel::default());

        registry.register("alice", channel.clone());
        registry.unregister("alice");
        registry.unregister("alice");
        assert!(!registry.push("alice", registered_event()));

        assert_eq!(channel.events.lock().len(), 0);
    }

    #[test]
    fn test_stale_disconnect_keeps_newer_registration() {
        let registry = NotificationRegistry::new();
        let old: Arc<dyn NotificationChannel> = Arc::new(RecordingChannel::default());
        let new = Arc::new(RecordingChannel::default());

        registry.register("alice", old.clone());
        registry.register("alice", new.clone());

        // The old connection's disconnect path fires after the replacement
        // has already registered.
        registry.unregister_channel("alice", &old);

        registry.push("alice", registered_event());
        assert_eq!(new.events.lock().len(), 1);
    }

    #[test]
    fn test_dead_channel_is_evicted_on_failed_push() {
        let registry = NotificationRegistry::new();
        registry.register("alice", Arc::new(ClosedChannel));

        assert!(!registry.push("alice", registered_event()));
        assert!(!registry.is_registered("alice"));
    }
}
