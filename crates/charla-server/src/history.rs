//! Append-only chat history files.
//!
//! One text file per conversation under the configured directory:
//! `direct_<a>_<b>.log` for direct chats, `<group id>.log` for groups.
//! Lines look like `[2024-03-01 18:22:05] Alice: hola`.
//!
//! Writes ride a detached task fed over an unbounded channel, so a chat
//! operation never waits on the filesystem and a failed write costs
//! nothing but a warning.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use charla_core::HistorySink;
use charla_shared::types::{DirectKey, Message};

/// File-backed [`HistorySink`]. Cheap to clone into the engine; the
/// writer task owns the files.
#[derive(Clone)]
pub struct FileHistory {
    tx: mpsc::UnboundedSender<Message>,
}

impl FileHistory {
    /// Create the history directory if missing and start the writer task.
    pub async fn new(dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "Chat history directory ready");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(dir, rx));
        Ok(Self { tx })
    }
}

impl HistorySink for FileHistory {
    fn record(&self, message: &Message) {
        // A closed channel means the runtime is shutting down; the line
        // has nowhere to go.
        let _ = self.tx.send(message.clone());
    }
}

async fn writer_task(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = append_line(&dir, &message).await {
            warn!(id = %message.id, error = %e, "Failed to append history line");
        }
    }
}

/// Append one formatted line to the conversation's log file.
pub async fn append_line(dir: &Path, message: &Message) -> std::io::Result<()> {
    let path = dir.join(file_name(message));
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(format_line(message).as_bytes()).await?;
    Ok(())
}

fn file_name(message: &Message) -> String {
    if message.is_group_message {
        format!("{}.log", message.chat_id)
    } else {
        let key = DirectKey::new(&message.sender_id, &message.chat_id);
        format!("direct_{}.log", key.file_stem())
    }
}

fn format_line(message: &Message) -> String {
    format!(
        "[{}] {}: {}\n",
        format_timestamp(message.timestamp),
        message.sender_name,
        message.content
    )
}

fn format_timestamp(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn sample(timestamp: i64, group: bool, content: &str) -> Message {
        Message {
            id: "1".into(),
            sender_id: "alice".into(),
            sender_name: "Alice".into(),
            content: content.into(),
            timestamp,
            chat_id: if group { "group_7".into() } else { "bob".into() },
            is_group_message: group,
            is_audio: false,
            audio_data: Bytes::new(),
            audio_duration: 0,
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(&sample(0, false, "x")), "direct_alice_bob.log");
        assert_eq!(file_name(&sample(0, true, "x")), "group_7.log");
    }

    #[test]
    fn test_line_format() {
        let line = format_line(&sample(0, false, "hola"));
        assert_eq!(line, "[1970-01-01 00:00:00] Alice: hola\n");
    }

    #[tokio::test]
    async fn test_append_line_appends() {
        let dir = tempfile::tempdir().unwrap();

        append_line(dir.path(), &sample(0, false, "uno")).await.unwrap();
        append_line(dir.path(), &sample(1000, false, "dos")).await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("direct_alice_bob.log"))
            .await
            .unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Alice: uno"));
        assert!(lines[1].ends_with("Alice: dos"));
    }

    #[tokio::test]
    async fn test_file_history_writes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistory::new(dir.path().to_path_buf()).await.unwrap();

        history.record(&sample(0, true, "hola grupo"));

        // The write is asynchronous; poll briefly for it to land.
        let path = dir.path().join("group_7.log");
        for _ in 0..40 {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("Alice: hola grupo"));
    }
}
