//! # charla-shared
//!
//! Domain types, wire protocol, and error taxonomy shared by the chat
//! engine and every transport front-end.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ChatError, DeliveryError};
pub use protocol::{ClientFrame, ServerEvent, SignalKind};
pub use types::{ChatSummary, DirectKey, Group, Message, User};
