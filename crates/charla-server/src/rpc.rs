//! TCP line-protocol transport.
//!
//! One JSON document per newline-terminated line. Requests carry an `id`
//! echoed on the matching response; after `register-callback`, server
//! events arrive interleaved as `{"event": ...}` lines on the same
//! connection. This is the request/response channel with server-initiated
//! callbacks for clients that do not speak WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use charla_core::NotificationChannel;
use charla_shared::error::{ChatError, DeliveryError};
use charla_shared::protocol::ServerEvent;
use charla_shared::types::base64_bytes;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    #[serde(flatten)]
    op: RpcOp,
}

/// The full inbound operation surface, discriminated by the `op` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum RpcOp {
    RegisterUser {
        user_id: String,
        display_name: String,
    },
    GetUser {
        user_id: String,
    },
    GetAllUsers,
    SendDirectMessage {
        from: String,
        to: String,
        content: String,
    },
    SendDirectAudio {
        from: String,
        to: String,
        #[serde(with = "base64_bytes")]
        audio: Bytes,
        duration_secs: u32,
    },
    GetDirectChatMessages {
        user_a: String,
        user_b: String,
    },
    GetUserDirectChats {
        user_id: String,
    },
    CreateGroup {
        owner_id: String,
        name: String,
        #[serde(default)]
        members: Vec<String>,
    },
    AddMembersToGroup {
        group_id: String,
        members: Vec<String>,
    },
    GetGroupMembers {
        group_id: String,
    },
    SendGroupMessage {
        from: String,
        group_id: String,
        content: String,
    },
    SendGroupAudio {
        from: String,
        group_id: String,
        #[serde(with = "base64_bytes")]
        audio: Bytes,
        duration_secs: u32,
    },
    GetGroupChatMessages {
        group_id: String,
    },
    GetUserGroupChats {
        user_id: String,
    },
    RegisterCallback {
        user_id: String,
    },
    UnregisterCallback {
        user_id: String,
    },
}

/// A connected RPC client as a notification channel: events become
/// `{"event": ...}` lines on the connection's writer.
struct RpcChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl NotificationChannel for RpcChannel {
    fn push(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        let line = match serde_json::to_string(&serde_json::json!({ "event": event })) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize rpc event");
                return Ok(());
            }
        };
        self.tx.send(line).map_err(|_| DeliveryError::Closed)
    }
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting RPC listener");
    run(listener, state).await
}

/// Accept loop on an already-bound listener. Split out so tests can bind
/// an ephemeral port first.
pub async fn run(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            debug!(%peer, "RPC connection opened");
            handle_connection(stream, state).await;
            debug!(%peer, "RPC connection closed");
        });
    }
}

async fn handle_connection(stream: TcpStream, state: AppState) {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer_handle = tokio::spawn(write_lines(writer, rx));

    // Set by register-callback; needed for conditional cleanup so a stale
    // connection cannot evict its replacement's registration.
    let mut bound: Option<(String, Arc<dyn NotificationChannel>)> = None;
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<RpcRequest>(line) {
                    Ok(request) => dispatch(&state, &tx, &mut bound, request),
                    Err(e) => {
                        debug!(error = %e, "Malformed RPC request");
                        serde_json::json!({ "id": 0, "error": format!("malformed request: {e}") })
                    }
                };
                if tx.send(response.to_string()).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "RPC read error");
                break;
            }
        }
    }

    if let Some((user_id, channel)) = bound {
        state.registry.unregister_channel(&user_id, &channel);
        info!(user = %user_id, "RPC callback connection closed");
    }
    writer_handle.abort();
}

/// Writer task: owns the socket's write half, drains the connection's
/// channel one line at a time.
async fn write_lines(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if writer.write_all(b"\n").await.is_err() {
            break;
        }
    }
}

fn dispatch(
    state: &AppState,
    tx: &mpsc::UnboundedSender<String>,
    bound: &mut Option<(String, Arc<dyn NotificationChannel>)>,
    request: RpcRequest,
) -> serde_json::Value {
    let id = request.id;
    match apply(state, tx, bound, request.op) {
        Ok(value) => serde_json::json!({ "id": id, "ok": value }),
        Err(e) => serde_json::json!({ "id": id, "error": e.to_string() }),
    }
}

/// Run one operation against the engine. Pure request/response except for
/// the callback ops, which bind or unbind this connection's writer as the
/// user's notification channel.
fn apply(
    state: &AppState,
    tx: &mpsc::UnboundedSender<String>,
    bound: &mut Option<(String, Arc<dyn NotificationChannel>)>,
    op: RpcOp,
) -> Result<serde_json::Value, ChatError> {
    match op {
        RpcOp::RegisterUser {
            user_id,
            display_name,
        } => {
            state.core.register_user(&user_id, &display_name);
            Ok(serde_json::Value::Null)
        }
        RpcOp::GetUser { user_id } => Ok(to_json(&state.core.user(&user_id))),
        RpcOp::GetAllUsers => Ok(to_json(&state.core.all_users())),
        RpcOp::SendDirectMessage { from, to, content } => {
            let message = state.core.send_direct_message(&from, &to, &content)?;
            Ok(to_json(&message))
        }
        RpcOp::SendDirectAudio {
            from,
            to,
            audio,
            duration_secs,
        } => {
            let message = state.core.send_direct_audio(&from, &to, audio, duration_secs)?;
            Ok(to_json(&message))
        }
        RpcOp::GetDirectChatMessages { user_a, user_b } => {
            Ok(to_json(&state.core.direct_chat_messages(&user_a, &user_b)))
        }
        RpcOp::GetUserDirectChats { user_id } => {
            Ok(to_json(&state.core.user_direct_chats(&user_id)))
        }
        RpcOp::CreateGroup {
            owner_id,
            name,
            members,
        } => {
            let group = state.core.create_group(&owner_id, &name, &members)?;
            Ok(to_json(&group))
        }
        RpcOp::AddMembersToGroup { group_id, members } => {
            state.core.add_members_to_group(&group_id, &members)?;
            Ok(serde_json::Value::Null)
        }
        RpcOp::GetGroupMembers { group_id } => Ok(to_json(&state.core.group_members(&group_id)?)),
        RpcOp::SendGroupMessage {
            from,
            group_id,
            content,
        } => {
            let message = state.core.send_group_message(&from, &group_id, &content)?;
            Ok(to_json(&message))
        }
        RpcOp::SendGroupAudio {
            from,
            group_id,
            audio,
            duration_secs,
        } => {
            let message = state
                .core
                .send_group_audio(&from, &group_id, audio, duration_secs)?;
            Ok(to_json(&message))
        }
        RpcOp::GetGroupChatMessages { group_id } => {
            Ok(to_json(&state.core.group_chat_messages(&group_id)))
        }
        RpcOp::GetUserGroupChats { user_id } => {
            Ok(to_json(&state.core.user_group_chats(&user_id)))
        }
        RpcOp::RegisterCallback { user_id } => {
            let channel: Arc<dyn NotificationChannel> = Arc::new(RpcChannel { tx: tx.clone() });
            state.core.register_callback(&user_id, channel.clone());
            *bound = Some((user_id, channel));
            Ok(serde_json::Value::Null)
        }
        RpcOp::UnregisterCallback { user_id } => {
            state.core.unregister_callback(&user_id);
            if bound.as_ref().is_some_and(|(owner, _)| *owner == user_id) {
                *bound = None;
            }
            Ok(serde_json::Value::Null)
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
