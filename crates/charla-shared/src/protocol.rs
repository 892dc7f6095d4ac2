use serde::{Deserialize, Serialize};

use crate::types::{ChatSummary, Message};

/// Frames a connected client may send, discriminated by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Bind this connection as the user's live notification channel.
    Register {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// Start a call: SDP offer for `to`.
    CallOffer {
        from: String,
        to: String,
        offer: serde_json::Value,
    },

    /// Accept a call: SDP answer for `to`.
    CallAnswer {
        from: String,
        to: String,
        answer: serde_json::Value,
    },

    /// Trickle one ICE candidate to `to`.
    IceCandidate {
        from: String,
        to: String,
        candidate: serde_json::Value,
    },

    /// Hang up an established call.
    CallEnd { from: String, to: String },

    /// Decline an incoming call.
    CallReject { from: String, to: String },
}

/// Events the server pushes to a registered channel, discriminated by the
/// `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Registration acknowledged; the connection now receives pushes.
    Registered {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// A message was stored in a chat this user is a recipient of.
    NewMessage { message: Message },

    /// A group this user belongs to was created. Carries the synthetic
    /// chat-list entry for the new group, not the full group record.
    NewGroup { group: ChatSummary },

    CallOffer {
        from: String,
        offer: serde_json::Value,
    },

    CallAnswer {
        from: String,
        answer: serde_json::Value,
    },

    IceCandidate {
        from: String,
        candidate: serde_json::Value,
    },

    CallEnd { from: String },

    CallReject { from: String },

    /// Bounced back to a caller whose offer could not reach the peer.
    CallUnavailable { reason: String },

    /// Request-level failure on a transport that has no reply slot.
    Error { message: String },
}

/// The five call-signaling kinds the relay forwards without inspecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    End,
    Reject,
}

impl SignalKind {
    /// Build the event delivered to the target peer. The payload travels
    /// verbatim; end/reject carry none.
    pub fn into_event(self, from: &str, payload: serde_json::Value) -> ServerEvent {
        match self {
            SignalKind::Offer => ServerEvent::CallOffer {
                from: from.to_string(),
                offer: payload,
            },
            SignalKind::Answer => ServerEvent::CallAnswer {
                from: from.to_string(),
                answer: payload,
            },
            SignalKind::IceCandidate => ServerEvent::IceCandidate {
                from: from.to_string(),
                candidate: payload,
            },
            SignalKind::End => ServerEvent::CallEnd {
                from: from.to_string(),
            },
            SignalKind::Reject => ServerEvent::CallReject {
                from: from.to_string(),
            },
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalKind::Offer => "call-offer",
            SignalKind::Answer => "call-answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::End => "call-end",
            SignalKind::Reject => "call-reject",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_frame_wire_shape() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"register","userId":"alice"}"#).unwrap();
        match frame {
            ClientFrame::Register { user_id } => assert_eq!(user_id, "alice"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_offer_frame_keeps_payload_opaque() {
        let raw = r#"{"type":"call-offer","from":"alice","to":"bob","offer":{"sdp":"v=0...","sdpType":"offer"}}"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        match frame {
            ClientFrame::CallOffer { from, to, offer } => {
                assert_eq!(from, "alice");
                assert_eq!(to, "bob");
                assert_eq!(offer["sdp"], "v=0...");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_server_event_tags() {
        let event = ServerEvent::Registered {
            user_id: "alice".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "registered");
        assert_eq!(json["userId"], "alice");

        let event = ServerEvent::CallUnavailable {
            reason: "bob is not connected".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call-unavailable");
    }

    #[test]
    fn test_signal_kind_into_event() {
        let event = SignalKind::Offer.into_event("alice", serde_json::json!({"sdp": "x"}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call-offer");
        assert_eq!(json["from"], "alice");
        assert_eq!(json["offer"]["sdp"], "x");

        let event = SignalKind::End.into_event("alice", serde_json::Value::Null);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call-end");
        assert!(json.get("payload").is_none());
    }
}
