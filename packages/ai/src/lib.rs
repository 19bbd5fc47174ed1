// ABOUTME: Assistant model integration for FormPilot
// ABOUTME: Anthropic streaming client and the system prompt that teaches the command grammar

pub mod prompts;
pub mod service;

pub use prompts::system_prompt;
pub use service::{
    conversation_messages, AIServiceError, AIServiceResult, AssistantClient, Message, SseDecoder,
    SseEvent,
};
