use std::collections::HashSet;

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Content stamped on voice-note messages in place of text.
pub const VOICE_NOTE_CONTENT: &str = "voice note";

/// Placeholder shown for a group chat that has no messages yet.
pub const EMPTY_GROUP_PLACEHOLDER: &str = "Group created";

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A registered chat user. Ids are opaque, caller-chosen strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
}

/// A group chat. The owner is always part of the member set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub members: HashSet<String>,
    /// Creation time in epoch millis. Used as the summary timestamp for
    /// groups that have no messages yet.
    pub created_at: i64,
}

impl Group {
    pub fn contains(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }
}

/// One chat message, text or voice note. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Decimal rendering of a globally unique, strictly increasing sequence.
    pub id: String,
    pub sender_id: String,
    /// Display name captured at send time; later renames do not rewrite
    /// stored messages.
    pub sender_name: String,
    pub content: String,
    /// Wall-clock millis at send time.
    pub timestamp: i64,
    /// Recipient user id for direct chats, group id for group chats.
    pub chat_id: String,
    pub is_group_message: bool,
    pub is_audio: bool,
    /// Raw audio bytes, base64 on the wire. Empty for text messages.
    #[serde(with = "base64_bytes", default, skip_serializing_if = "Bytes::is_empty")]
    pub audio_data: Bytes,
    /// Voice-note length in seconds. Zero for text messages.
    #[serde(default)]
    pub audio_duration: u32,
}

impl Message {
    pub fn text(
        id: u64,
        sender_id: &str,
        sender_name: &str,
        content: &str,
        chat_id: &str,
        is_group_message: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            content: content.to_string(),
            timestamp: now_millis(),
            chat_id: chat_id.to_string(),
            is_group_message,
            is_audio: false,
            audio_data: Bytes::new(),
            audio_duration: 0,
        }
    }

    pub fn voice(
        id: u64,
        sender_id: &str,
        sender_name: &str,
        chat_id: &str,
        is_group_message: bool,
        audio_data: Bytes,
        audio_duration: u32,
    ) -> Self {
        Self {
            id: id.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            content: VOICE_NOTE_CONTENT.to_string(),
            timestamp: now_millis(),
            chat_id: chat_id.to_string(),
            is_group_message,
            is_audio: true,
            audio_data,
            audio_duration,
        }
    }
}

/// On-demand view of one conversation for chat-list screens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    /// Peer user id for direct chats, group id for group chats.
    pub chat_id: String,
    pub chat_name: String,
    pub last_message_content: String,
    pub last_message_timestamp: i64,
    pub is_group: bool,
}

/// Canonical key for a direct conversation: the two participant ids in
/// lexicographic order, so `new(a, b) == new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectKey {
    low: String,
    high: String,
}

impl DirectKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The other participant relative to `user_id`, if `user_id` is a side
    /// of this chat.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        if self.low == user_id {
            Some(&self.high)
        } else if self.high == user_id {
            Some(&self.low)
        } else {
            None
        }
    }

    /// Filesystem-safe rendering used for history file names. Bytes
    /// outside `[A-Za-z0-9_-]` are percent-encoded, so a caller-chosen id
    /// cannot smuggle a path separator into the file name.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", encode_stem(&self.low), encode_stem(&self.high))
    }
}

fn encode_stem(id: &str) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

impl std::fmt::Display for DirectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}

/// Serde adapter: `Bytes` as a standard base64 string.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_key_is_order_independent() {
        assert_eq!(DirectKey::new("alice", "bob"), DirectKey::new("bob", "alice"));
        assert_eq!(DirectKey::new("alice", "bob").to_string(), "alice:bob");
        assert_eq!(DirectKey::new("bob", "alice").file_stem(), "alice_bob");
    }

    #[test]
    fn test_file_stem_encodes_path_characters() {
        // '.' sorts before 'b', so the hostile id is the low half.
        let key = DirectKey::new("../etc", "bob");
        assert_eq!(key.file_stem(), "%2E%2E%2Fetc_bob");

        assert_eq!(DirectKey::new("alice", "bob").file_stem(), "alice_bob");
    }

    #[test]
    fn test_direct_key_peer_lookup() {
        let key = DirectKey::new("bob", "alice");
        assert_eq!(key.peer_of("alice"), Some("bob"));
        assert_eq!(key.peer_of("bob"), Some("alice"));
        assert_eq!(key.peer_of("mallory"), None);
        assert!(key.involves("alice"));
        assert!(!key.involves("mallory"));
    }

    #[test]
    fn test_text_message_json_shape() {
        let msg = Message::text(7, "alice", "Alice", "hola", "bob", false);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["id"], "7");
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["senderName"], "Alice");
        assert_eq!(json["chatId"], "bob");
        assert_eq!(json["isGroupMessage"], false);
        assert_eq!(json["isAudio"], false);
        // Text messages carry no audio payload on the wire.
        assert!(json.get("audioData").is_none());
    }

    #[test]
    fn test_voice_message_base64_roundtrip() {
        let msg = Message::voice(
            8,
            "alice",
            "Alice",
            "group_1",
            true,
            Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]),
            3,
        );

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"audioData\":\"3q2+7w==\""));

        let restored: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.audio_data, msg.audio_data);
        assert_eq!(restored.audio_duration, 3);
        assert_eq!(restored.content, VOICE_NOTE_CONTENT);
    }
}
