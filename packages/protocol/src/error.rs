// ABOUTME: Diagnostics produced while extracting and applying form commands
// ABOUTME: Parse, reference and schema errors are reported, never thrown

use serde::Serialize;
use thiserror::Error;

use crate::grammar::CommandKind;

/// Broad category of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Parse,
    Reference,
    Schema,
}

#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolError {
    /// A command keyword was found but its payload is not valid JSON
    #[error("Could not parse {command} payload: {message}")]
    Parse {
        command: CommandKind,
        message: String,
    },

    /// A field id or position target does not exist in the document
    #[error("{command} references unknown field '{id}': {fallback}")]
    Reference {
        command: CommandKind,
        id: String,
        fallback: String,
    },

    /// Payload is valid JSON but misses required keys or carries invalid values
    #[error("Invalid {} payload: {message}", command_label(.command))]
    Schema {
        command: Option<CommandKind>,
        message: String,
    },

    /// Command was dropped by the apply policy
    #[error("{command} skipped: {reason}")]
    Preempted {
        command: CommandKind,
        reason: String,
    },

    #[error("Message too large: {size} bytes exceeds limit of {limit} bytes")]
    InputTooLarge { size: usize, limit: usize },
}

fn command_label(command: &Option<CommandKind>) -> &'static str {
    command.map(|c| c.keyword()).unwrap_or("command")
}

impl ProtocolError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::Parse { .. } | Self::InputTooLarge { .. } => DiagnosticKind::Parse,
            Self::Reference { .. } => DiagnosticKind::Reference,
            Self::Schema { .. } | Self::Preempted { .. } => DiagnosticKind::Schema,
        }
    }

    pub fn is_parse(&self) -> bool {
        self.kind() == DiagnosticKind::Parse
    }

    pub(crate) fn schema(command: CommandKind, message: impl Into<String>) -> Self {
        Self::Schema {
            command: Some(command),
            message: message.into(),
        }
    }

    pub(crate) fn reference(
        command: CommandKind,
        id: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self::Reference {
            command,
            id: id.into(),
            fallback: fallback.into(),
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
