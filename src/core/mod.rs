pub mod api;
pub mod chat;
pub mod normalize;
pub mod store;

use thiserror::Error;

/// Errors that surface at the turn boundary. Every other failure mode is
/// folded into the conversational reply so the caller always receives a
/// normal response envelope.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Not authorized to access this user's chat")]
    Forbidden,
    #[error("Conversation not found")]
    ConversationNotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
