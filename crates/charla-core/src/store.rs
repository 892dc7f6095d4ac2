use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use charla_shared::types::{DirectKey, Message};

type ChatLog = Arc<Mutex<Vec<Message>>>;

/// Append-only message logs, one per conversation.
///
/// The maps hand out per-chat logs; each log's mutex serializes appends to
/// that one conversation, while appends to different conversations run in
/// parallel. Map guards are dropped before a log mutex is taken.
pub struct MessageStore {
    direct: DashMap<DirectKey, ChatLog>,
    groups: DashMap<String, ChatLog>,
    next_id: AtomicU64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            direct: DashMap::new(),
            groups: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Issue the next message id: unique and strictly increasing across
    /// every chat in the process, direct and group alike.
    pub fn next_message_id(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        assert_ne!(id, u64::MAX, "message id space exhausted");
        id
    }

    pub fn append_direct(&self, key: &DirectKey, message: Message) {
        let log = Arc::clone(self.direct.entry(key.clone()).or_default().value());
        log.lock().push(message);
    }

    pub fn append_group(&self, group_id: &str, message: Message) {
        let log = Arc::clone(self.groups.entry(group_id.to_string()).or_default().value());
        log.lock().push(message);
    }

    /// Snapshot of a direct conversation, oldest first. Unknown chats read
    /// as empty.
    pub fn read_direct(&self, key: &DirectKey) -> Vec<Message> {
        self.direct
            .get(key)
            .map(|log| log.lock().clone())
            .unwrap_or_default()
    }

    /// Snapshot of a group conversation, oldest first. Unknown chats read
    /// as empty.
    pub fn read_group(&self, group_id: &str) -> Vec<Message> {
        self.groups
            .get(group_id)
            .map(|log| log.lock().clone())
            .unwrap_or_default()
    }

    pub fn last_direct(&self, key: &DirectKey) -> Option<Message> {
        self.direct
            .get(key)
            .and_then(|log| log.lock().last().cloned())
    }

    pub fn last_group(&self, group_id: &str) -> Option<Message> {
        self.groups
            .get(group_id)
            .and_then(|log| log.lock().last().cloned())
    }

    /// Every direct conversation `user_id` is a side of. Exact side match,
    /// never a substring match on the key.
    pub fn direct_keys_for(&self, user_id: &str) -> Vec<DirectKey> {
        self.direct
            .iter()
            .filter(|entry| entry.key().involves(user_id))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
