// ABOUTME: Conversation message types for the form assistant
// ABOUTME: Roles, lifecycle status, derived mode and the dedup key of a message

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of characters of content that identify a message together with its position
pub const MESSAGE_KEY_PREFIX_CHARS: usize = 64;

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Lifecycle of an assistant message: Streaming -> Completed -> Applied, or
/// Streaming -> Cancelled. User messages are created Completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Streaming,
    Completed,
    Applied,
    Cancelled,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Applied => "applied",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (Self::Streaming, Self::Completed)
                | (Self::Streaming, Self::Cancelled)
                | (Self::Completed, Self::Applied)
        )
    }

    /// The stream has ended, successfully or not
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Streaming)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Badge shown next to an assistant message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// The message edits the form
    Execution,
    /// Pure conversation
    Strategy,
}

/// A message in the assistant panel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    /// Raw text, including any embedded commands
    pub content: String,
    /// What the panel shows: never contains command syntax
    pub display_content: String,
    /// Progress indicators such as "Adding 2 fields..."
    #[serde(default)]
    pub thinking: Vec<String>,
    pub status: MessageStatus,
    #[serde(default)]
    pub mode: Option<MessageMode>,
    #[serde(default)]
    pub pinned_mode: Option<MessageMode>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: nanoid::nanoid!(),
            role: MessageRole::User,
            display_content: content.clone(),
            content,
            thinking: Vec::new(),
            status: MessageStatus::Completed,
            mode: None,
            pinned_mode: None,
            created_at: Utc::now(),
        }
    }

    /// An empty assistant message about to receive stream chunks
    pub fn assistant_streaming() -> Self {
        Self {
            id: nanoid::nanoid!(),
            role: MessageRole::Assistant,
            content: String::new(),
            display_content: String::new(),
            thinking: Vec::new(),
            status: MessageStatus::Streaming,
            mode: None,
            pinned_mode: None,
            created_at: Utc::now(),
        }
    }

    /// An assistant message generated locally (no commands, nothing to apply)
    pub fn assistant_notice(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: nanoid::nanoid!(),
            role: MessageRole::Assistant,
            display_content: content.clone(),
            content,
            thinking: Vec::new(),
            status: MessageStatus::Applied,
            mode: Some(MessageMode::Strategy),
            pinned_mode: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    /// Mode shown in the badge: a pinned mode wins over the derived one
    pub fn effective_mode(&self) -> Option<MessageMode> {
        self.pinned_mode.or(self.mode)
    }

    /// Identity used by the apply-once guard
    pub fn key(&self, position: usize) -> MessageKey {
        MessageKey {
            position,
            prefix: self.content.chars().take(MESSAGE_KEY_PREFIX_CHARS).collect(),
        }
    }
}

/// Position in the conversation plus a content prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub position: usize,
    pub prefix: String,
}
