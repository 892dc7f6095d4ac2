//! # charla-core
//!
//! The in-memory chat engine: user/group directory, per-conversation
//! message logs, notification fan-out, and call-signal relay.
//!
//! Everything here is synchronous and transport-free. Transports adapt
//! their connections into [`NotificationChannel`]s and call into
//! [`ChatCore`]; the engine never holds a lock across a channel push.

pub mod chat;
pub mod directory;
pub mod notify;
pub mod relay;
pub mod store;

pub use chat::{ChatCore, HistorySink};
pub use directory::Directory;
pub use notify::{NotificationChannel, NotificationRegistry};
pub use relay::SignalingRelay;
pub use store::MessageStore;
