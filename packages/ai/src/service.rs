// ABOUTME: Streaming client for the Anthropic Messages API
// ABOUTME: Turns the conversation and current form into a stream of reply text chunks

use formpilot_chat::{AssistantSession, ChatMessage, MessageRole, MessageStatus};
use formpilot_config::AssistantSettings;
use formpilot_core::FormDocument;
use futures::stream::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::prompts::system_prompt;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum AIServiceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Conversation has no user message to answer")]
    EmptyConversation,
}

pub type AIServiceResult<T> = Result<T, AIServiceError>;

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    TextDelta(String),
    Error(String),
    Stop,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes may be split anywhere, including inside a multi-byte character; only
/// complete events are decoded as UTF-8.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();
        while let Some(event_end) = find_event_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..event_end + 2).collect();
            let event = String::from_utf8_lossy(&raw[..event_end]);

            for line in event.lines() {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                if let Some(parsed) = parse_event_data(data.trim_start()) {
                    events.push(parsed);
                }
            }
        }
        events
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn parse_event_data(data: &str) -> Option<SseEvent> {
    let event_json = serde_json::from_str::<serde_json::Value>(data).ok()?;
    match event_json["type"].as_str()? {
        "content_block_delta" => event_json["delta"]["text"]
            .as_str()
            .map(|text| SseEvent::TextDelta(text.to_string())),
        "message_stop" => Some(SseEvent::Stop),
        "error" => Some(SseEvent::Error(
            event_json["error"]["message"]
                .as_str()
                .unwrap_or("Unknown streaming error")
                .to_string(),
        )),
        _ => None,
    }
}

/// Map the chat history onto alternating user/assistant turns.
///
/// Streaming messages are skipped and consecutive same-role messages are
/// merged. Assistant replies keep their raw text so the model sees the
/// commands it issued.
pub fn conversation_messages(history: &[ChatMessage]) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();
    for message in history {
        if message.status == MessageStatus::Streaming || message.content.trim().is_empty() {
            continue;
        }
        let role = message.role.as_str();
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => messages.push(Message {
                role: role.to_string(),
                content: message.content.clone(),
            }),
        }
    }

    // The API expects the conversation to open with the user
    while messages
        .first()
        .is_some_and(|m| m.role != MessageRole::User.as_str())
    {
        messages.remove(0);
    }
    messages
}

/// Client that streams assistant replies
pub struct AssistantClient {
    client: Client,
    settings: AssistantSettings,
}

impl AssistantClient {
    pub fn new(settings: AssistantSettings) -> AIServiceResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    /// Get the model being used by this client
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Start a session over `form` with the configured apply policy
    pub fn start_session(&self, form: FormDocument) -> AssistantSession {
        AssistantSession::new(form).with_policy(self.settings.apply_policy)
    }

    /// Resume a stored conversation with the configured apply policy
    pub fn restore_session(&self, form: FormDocument, messages: Vec<ChatMessage>) -> AssistantSession {
        AssistantSession::restore(form, messages).with_policy(self.settings.apply_policy)
    }

    /// Stream the reply to the last user message as text chunks
    pub async fn stream_reply(
        &self,
        history: &[ChatMessage],
        form: &FormDocument,
    ) -> AIServiceResult<impl Stream<Item = Result<String, AIServiceError>>> {
        let api_key = self
            .settings
            .api_key
            .as_ref()
            .ok_or(AIServiceError::NoApiKey)?;

        let messages = conversation_messages(history);
        if messages.last().map(|m| m.role.as_str()) != Some(MessageRole::User.as_str()) {
            return Err(AIServiceError::EmptyConversation);
        }

        let request = AnthropicRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            messages,
            system: Some(system_prompt(form)),
            stream: true,
        };

        info!(
            "Making Anthropic API streaming request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(self.settings.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Anthropic API request timed out");
                    AIServiceError::ApiError("Request timed out. The AI service may be overloaded or unavailable.".to_string())
                } else if e.is_connect() {
                    error!("Failed to connect to Anthropic API: {}", e);
                    AIServiceError::ApiError(format!("Connection failed: {}. Please check your internet connection.", e))
                } else {
                    error!("Anthropic API request failed: {}", e);
                    AIServiceError::RequestFailed(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Anthropic API error: {} - {}", status, error_text);
            return Err(AIServiceError::ApiError(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let stream = async_stream::stream! {
            use futures::StreamExt;
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for event in decoder.push(&bytes) {
                            match event {
                                SseEvent::TextDelta(text) => yield Ok(text),
                                SseEvent::Stop => return,
                                SseEvent::Error(message) => {
                                    warn!("Anthropic stream error: {}", message);
                                    yield Err(AIServiceError::ApiError(message));
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(AIServiceError::RequestFailed(e));
                        return;
                    }
                }
            }
        };

        Ok(stream)
    }
}
