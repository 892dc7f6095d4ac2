use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use charla_shared::error::ChatError;
use charla_shared::protocol::ServerEvent;
use charla_shared::types::{
    ChatSummary, DirectKey, Group, Message, User, EMPTY_GROUP_PLACEHOLDER,
};

use crate::directory::Directory;
use crate::notify::{NotificationChannel, NotificationRegistry};
use crate::store::MessageStore;

/// Fire-and-forget persistence hook invoked for every stored message.
/// Implementations must not block; a failed write stays on their side of
/// the boundary and never reaches the chat operation.
pub trait HistorySink: Send + Sync {
    fn record(&self, message: &Message);
}

/// The orchestration layer: validates, mutates directory and store,
/// computes recipient sets, and triggers notification and history
/// recording.
///
/// Every method is synchronous and atomic from the caller's point of
/// view. A failed precondition leaves all state untouched. No lock is
/// held across a channel push.
pub struct ChatCore {
    directory: Directory,
    store: MessageStore,
    registry: Arc<NotificationRegistry>,
    history: Option<Arc<dyn HistorySink>>,
    echo_to_sender: bool,
}

impl ChatCore {
    pub fn new(registry: Arc<NotificationRegistry>) -> Self {
        Self {
            directory: Directory::new(),
            store: MessageStore::new(),
            registry,
            history: None,
            echo_to_sender: false,
        }
    }

    /// Attach a persistence hook for stored messages.
    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    /// Also push each stored message back to its sender. Off by default:
    /// clients render their own sends locally and would show duplicates.
    pub fn with_echo_to_sender(mut self, echo: bool) -> Self {
        self.echo_to_sender = echo;
        self
    }

    // --- users ---

    /// Create-or-rename. Registering an existing id updates the display
    /// name; this never fails.
    pub fn register_user(&self, user_id: &str, display_name: &str) {
        self.directory.upsert_user(user_id, display_name);
        info!(user = %user_id, name = %display_name, "Registered user");
    }

    pub fn user(&self, user_id: &str) -> Option<User> {
        self.directory.user(user_id)
    }

    pub fn all_users(&self) -> Vec<User> {
        self.directory.all_users()
    }

    // --- direct chats ---

    /// Store a direct message and notify the recipient's live channel.
    ///
    /// Only the sender must be registered (their display name is stamped
    /// onto the message). The recipient may be unknown: the message is
    /// stored anyway so the conversation is waiting once they register.
    pub fn send_direct_message(
        &self,
        from: &str,
        to: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        let sender = self.sender(from)?;
        let message = Message::text(
            self.store.next_message_id(),
            from,
            &sender.display_name,
            content,
            to,
            false,
        );
        Ok(self.deliver_direct(to, message))
    }

    /// Store a direct voice note. Same flow as a text send; the content is
    /// a fixed placeholder and the payload rides in `audio_data`.
    pub fn send_direct_audio(
        &self,
        from: &str,
        to: &str,
        audio: Bytes,
        duration_secs: u32,
    ) -> Result<Message, ChatError> {
        let sender = self.sender(from)?;
        let message = Message::voice(
            self.store.next_message_id(),
            from,
            &sender.display_name,
            to,
            false,
            audio,
            duration_secs,
        );
        Ok(self.deliver_direct(to, message))
    }

    /// Full history between two users, oldest first. Unknown pairs read as
    /// empty; reads never fail.
    pub fn direct_chat_messages(&self, a: &str, b: &str) -> Vec<Message> {
        self.store.read_direct(&DirectKey::new(a, b))
    }

    /// Summaries of every direct conversation `user_id` is part of, most
    /// recent activity first. A peer with no directory record is shown
    /// under their bare id.
    pub fn user_direct_chats(&self, user_id: &str) -> Vec<ChatSummary> {
        let mut summaries = Vec::new();

        for key in self.store.direct_keys_for(user_id) {
            let Some(peer) = key.peer_of(user_id) else {
                continue;
            };
            let Some(last) = self.store.last_direct(&key) else {
                continue;
            };
            let chat_name = self
                .directory
                .user(peer)
                .map(|user| user.display_name)
                .unwrap_or_else(|| peer.to_string());

            summaries.push(ChatSummary {
                chat_id: peer.to_string(),
                chat_name,
                last_message_content: last.content,
                last_message_timestamp: last.timestamp,
                is_group: false,
            });
        }

        sort_by_recency(&mut summaries);
        summaries
    }

    // --- group chats ---

    /// Create a group and notify every member, owner included, so their
    /// chat lists pick it up immediately.
    pub fn create_group(
        &self,
        owner_id: &str,
        name: &str,
        members: &[String],
    ) -> Result<Group, ChatError> {
        let group = self.directory.create_group(owner_id, name, members)?;

        // Members learn about the group through a synthetic chat-list entry;
        // the placeholder stands in until the first message lands.
        let summary = ChatSummary {
            chat_id: group.id.clone(),
            chat_name: group.name.clone(),
            last_message_content: EMPTY_GROUP_PLACEHOLDER.to_string(),
            last_message_timestamp: group.created_at,
            is_group: true,
        };
        for member in &group.members {
            self.registry.push(
                member,
                ServerEvent::NewGroup {
                    group: summary.clone(),
                },
            );
        }
        Ok(group)
    }

    /// Union new ids into the member set. No notification; new members see
    /// the group on their next chat-list read and can read its full
    /// history right away.
    pub fn add_members_to_group(
        &self,
        group_id: &str,
        members: &[String],
    ) -> Result<(), ChatError> {
        self.directory.add_members(group_id, members)?;
        info!(group = %group_id, added = members.len(), "Added group members");
        Ok(())
    }

    pub fn group_members(&self, group_id: &str) -> Result<Vec<String>, ChatError> {
        self.directory.group_members(group_id)
    }

    /// Store a group message and fan out to every member except the
    /// sender.
    pub fn send_group_message(
        &self,
        from: &str,
        group_id: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        let (sender, group) = self.group_sender(from, group_id)?;
        let message = Message::text(
            self.store.next_message_id(),
            from,
            &sender.display_name,
            content,
            group_id,
            true,
        );
        Ok(self.deliver_group(&group, message))
    }

    /// Store a group voice note. Same validation and fan-out as a text
    /// send.
    pub fn send_group_audio(
        &self,
        from: &str,
        group_id: &str,
        audio: Bytes,
        duration_secs: u32,
    ) -> Result<Message, ChatError> {
        let (sender, group) = self.group_sender(from, group_id)?;
        let message = Message::voice(
            self.store.next_message_id(),
            from,
            &sender.display_name,
            group_id,
            true,
            audio,
            duration_secs,
        );
        Ok(self.deliver_group(&group, message))
    }

    /// Full group history, oldest first. Reads never fail; an unknown
    /// group reads as empty.
    pub fn group_chat_messages(&self, group_id: &str) -> Vec<Message> {
        self.store.read_group(group_id)
    }

    /// Summaries of every group `user_id` belongs to, most recent activity
    /// first. A group with no messages yet shows a placeholder stamped
    /// with the group's creation time.
    pub fn user_group_chats(&self, user_id: &str) -> Vec<ChatSummary> {
        let mut summaries = Vec::new();

        for group in self.directory.groups_with_member(user_id) {
            let summary = match self.store.last_group(&group.id) {
                Some(last) => ChatSummary {
                    chat_id: group.id,
                    chat_name: group.name,
                    last_message_content: last.content,
                    last_message_timestamp: last.timestamp,
                    is_group: true,
                },
                None => ChatSummary {
                    chat_id: group.id,
                    chat_name: group.name,
                    last_message_content: EMPTY_GROUP_PLACEHOLDER.to_string(),
                    last_message_timestamp: group.created_at,
                    is_group: true,
                },
            };
            summaries.push(summary);
        }

        sort_by_recency(&mut summaries);
        summaries
    }

    // --- notification channels ---

    /// Bind `channel` as the user's live notification channel. The newest
    /// registration wins.
    pub fn register_callback(&self, user_id: &str, channel: Arc<dyn NotificationChannel>) {
        self.registry.register(user_id, channel);
        info!(user = %user_id, "Registered notification channel");
    }

    pub fn unregister_callback(&self, user_id: &str) {
        self.registry.unregister(user_id);
        info!(user = %user_id, "Unregistered notification channel");
    }

    // --- internals ---

    fn sender(&self, user_id: &str) -> Result<User, ChatError> {
        self.directory
            .user(user_id)
            .ok_or_else(|| ChatError::UserNotFound(user_id.to_string()))
    }

    fn group_sender(&self, from: &str, group_id: &str) -> Result<(User, Group), ChatError> {
        let sender = self.sender(from)?;
        let group = self.directory.group(group_id)?;
        if !group.contains(from) {
            return Err(ChatError::NotAMember {
                user: from.to_string(),
                group: group_id.to_string(),
            });
        }
        Ok((sender, group))
    }

    fn deliver_direct(&self, to: &str, message: Message) -> Message {
        let key = DirectKey::new(&message.sender_id, to);
        self.store.append_direct(&key, message.clone());
        self.record_history(&message);

        info!(
            id = %message.id,
            from = %message.sender_id,
            to = %to,
            audio = message.is_audio,
            "Stored direct message"
        );

        self.registry.push(
            to,
            ServerEvent::NewMessage {
                message: message.clone(),
            },
        );
        if self.echo_to_sender && to != message.sender_id {
            self.registry.push(
                &message.sender_id,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
            );
        }
        message
    }

    fn deliver_group(&self, group: &Group, message: Message) -> Message {
        self.store.append_group(&group.id, message.clone());
        self.record_history(&message);

        info!(
            id = %message.id,
            from = %message.sender_id,
            group = %group.id,
            audio = message.is_audio,
            "Stored group message"
        );

        for member in &group.members {
            if member == &message.sender_id && !self.echo_to_sender {
                continue;
            }
            self.registry.push(
                member,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
            );
        }
        message
    }

    fn record_history(&self, message: &Message) {
        if let Some(sink) = &self.history {
            sink.record(message);
        }
    }
}

/// Most recent activity first; stable, so equal timestamps keep their
/// input order.
fn sort_by_recency(summaries: &mut [ChatSummary]) {
    summaries.sort_by(|a, b| b.last_message_timestamp.cmp(&a.last_message_timestamp));
}
