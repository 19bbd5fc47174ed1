// ABOUTME: Error types for the chat package
// ABOUTME: Turn lifecycle violations and stream failures

use thiserror::Error;

use crate::types::MessageStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("An assistant reply is still streaming")]
    TurnInFlight,

    #[error("No assistant reply is streaming")]
    NoActiveTurn,

    #[error("Message not found: {0}")]
    MessageNotFound(usize),

    #[error("Message {0} is not an assistant message")]
    NotAssistantMessage(usize),

    #[error("Message {index} cannot move from {from} to {to}")]
    InvalidTransition {
        index: usize,
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("Assistant stream failed: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
