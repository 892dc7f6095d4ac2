use thiserror::Error;

/// Failures a chat operation can surface to its caller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("User {user} is not a member of group {group}")]
    NotAMember { user: String, group: String },
}

/// A push toward a registered channel failed. Never propagated out of a
/// chat operation; the registry drops the channel and moves on.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Notification channel closed")]
    Closed,
}
