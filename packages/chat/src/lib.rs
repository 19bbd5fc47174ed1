// ABOUTME: FormPilot assistant chat library
// ABOUTME: Streaming turns, display projection, progress indicators and apply-once sessions

pub mod error;
pub mod indicators;
pub mod projector;
pub mod session;
pub mod types;

pub use error::{ChatError, Result};
pub use indicators::{classify_mode, complete_indicator, thinking_indicators};
pub use projector::{project_display, DisplayProjector};
pub use session::{AssistantSession, CancelFlag, TurnOutcome, FALLBACK_NOTICE};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ChatError, Result};
    pub use crate::session::{AssistantSession, CancelFlag, TurnOutcome};
    pub use crate::types::{ChatMessage, MessageMode, MessageRole, MessageStatus};
}
