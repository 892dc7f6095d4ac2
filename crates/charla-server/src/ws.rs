//! WebSocket transport.
//!
//! Connections follow the actor pattern: the socket splits into a reader
//! loop and a writer task, with an unbounded channel between any producer
//! and the writer. A `register` frame binds that channel into the
//! notification registry, so pushes triggered by any operation in the
//! process ride the connection's own writer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use charla_core::NotificationChannel;
use charla_shared::error::DeliveryError;
use charla_shared::protocol::{ClientFrame, ServerEvent, SignalKind};

use crate::state::AppState;

/// A connected WebSocket as a notification channel: the event is
/// serialized and handed to the connection's writer task.
pub struct WsChannel {
    tx: mpsc::UnboundedSender<WsMessage>,
}

impl WsChannel {
    pub fn new(tx: mpsc::UnboundedSender<WsMessage>) -> Self {
        Self { tx }
    }
}

impl NotificationChannel for WsChannel {
    fn push(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize websocket event");
                return Ok(());
            }
        };
        self.tx
            .send(WsMessage::Text(json))
            .map_err(|_| DeliveryError::Closed)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, state))
}

/// Reader loop for one connection. Returns when the socket closes; the
/// writer task is torn down and any binding this connection still owns is
/// removed.
async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
    let writer = tokio::spawn(writer_task(ws_sender, rx));

    // Set by the register frame; needed for conditional cleanup so a
    // stale connection cannot evict its replacement's registration.
    let mut bound: Option<(String, Arc<dyn NotificationChannel>)> = None;

    while let Some(received) = ws_receiver.next().await {
        let frame = match received {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "Unparseable websocket frame");
                    send_event(
                        &tx,
                        &ServerEvent::Error {
                            message: format!("malformed frame: {e}"),
                        },
                    );
                    continue;
                }
            },
            Ok(WsMessage::Ping(data)) => {
                let _ = tx.send(WsMessage::Pong(data));
                continue;
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket receive error");
                break;
            }
        };

        match frame {
            ClientFrame::Register { user_id } => {
                let channel: Arc<dyn NotificationChannel> = Arc::new(WsChannel::new(tx.clone()));
                state.core.register_callback(&user_id, channel.clone());
                send_event(
                    &tx,
                    &ServerEvent::Registered {
                        user_id: user_id.clone(),
                    },
                );
                info!(user = %user_id, "WebSocket connection registered");
                bound = Some((user_id, channel));
            }
            ClientFrame::CallOffer { from, to, offer } => {
                state.relay.forward(SignalKind::Offer, &from, &to, offer);
            }
            ClientFrame::CallAnswer { from, to, answer } => {
                state.relay.forward(SignalKind::Answer, &from, &to, answer);
            }
            ClientFrame::IceCandidate {
                from,
                to,
                candidate,
            } => {
                state
                    .relay
                    .forward(SignalKind::IceCandidate, &from, &to, candidate);
            }
            ClientFrame::CallEnd { from, to } => {
                state
                    .relay
                    .forward(SignalKind::End, &from, &to, serde_json::Value::Null);
            }
            ClientFrame::CallReject { from, to } => {
                state
                    .relay
                    .forward(SignalKind::Reject, &from, &to, serde_json::Value::Null);
            }
        }
    }

    if let Some((user_id, channel)) = bound {
        state.registry.unregister_channel(&user_id, &channel);
        info!(user = %user_id, "WebSocket connection closed");
    }
    writer.abort();
}

/// Writer task: owns the sink, drains the connection's channel.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}

fn send_event(tx: &mpsc::UnboundedSender<WsMessage>, event: &ServerEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = tx.send(WsMessage::Text(json));
    }
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ws_channel_serializes_events_as_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = WsChannel::new(tx);

        channel
            .push(ServerEvent::Registered {
                user_id: "alice".into(),
            })
            .unwrap();

        match rx.recv().await.unwrap() {
            WsMessage::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(json["type"], "registered");
                assert_eq!(json["userId"], "alice");
            }
            other => panic!("unexpected websocket message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ws_channel_reports_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let channel = WsChannel::new(tx);

        let err = channel
            .push(ServerEvent::Registered {
                user_id: "alice".into(),
            })
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Closed));
    }
}
