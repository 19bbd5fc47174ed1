// ABOUTME: Assistant session owning the form document and the conversation
// ABOUTME: Drives streaming turns and applies each completed reply exactly once

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use formpilot_core::FormDocument;
use formpilot_protocol::{extract_commands, ApplyPolicy, FormApplier, ProtocolError};
use futures::future::poll_fn;
use futures::task::AtomicWaker;
use futures::{pin_mut, Stream};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::indicators::{classify_mode, complete_indicators, thinking_indicators};
use crate::projector::DisplayProjector;
use crate::types::{ChatMessage, MessageKey, MessageMode, MessageStatus};

/// Shown when a reply tried to edit the form but none of its commands could be read
pub const FALLBACK_NOTICE: &str = "I tried to update the form but couldn't read my own \
instructions, so nothing was changed. Could you ask again, maybe one change at a time?";

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

/// Cancellation shared between the UI and a running turn.
///
/// A turn waiting on a stalled stream is woken as soon as `cancel` is called.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.waker.wake();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Ready once cancelled, otherwise registers the task to be woken by `cancel`
    pub fn poll_cancelled(&self, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_cancelled() {
            return Poll::Ready(());
        }
        self.0.waker.register(cx.waker());
        if self.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    pub async fn cancelled(&self) {
        poll_fn(|cx| self.poll_cancelled(cx)).await
    }
}

enum StreamStep<T> {
    Item(T),
    Ended,
    Cancelled,
}

/// Result of applying one assistant message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub message_index: usize,
    pub document: FormDocument,
    pub diagnostics: Vec<ProtocolError>,
    pub applied: usize,
    pub changed: bool,
    /// An explanatory message was appended because nothing could be read
    pub fallback_notice: bool,
}

#[derive(Debug)]
struct ActiveTurn {
    message_index: usize,
    projector: DisplayProjector,
}

pub struct AssistantSession {
    form: FormDocument,
    messages: Vec<ChatMessage>,
    applier: FormApplier,
    policy: ApplyPolicy,
    pinned_mode: Option<MessageMode>,
    active: Option<ActiveTurn>,
    applied_keys: HashSet<MessageKey>,
}

impl AssistantSession {
    pub fn new(form: FormDocument) -> Self {
        Self {
            form,
            messages: Vec::new(),
            applier: FormApplier::new(),
            policy: ApplyPolicy::default(),
            pinned_mode: None,
            active: None,
            applied_keys: HashSet::new(),
        }
    }

    /// Resume a stored conversation. Messages left Streaming by a crash are
    /// marked Cancelled; Applied messages are never applied again.
    pub fn restore(form: FormDocument, mut messages: Vec<ChatMessage>) -> Self {
        let mut applied_keys = HashSet::new();
        for (position, message) in messages.iter_mut().enumerate() {
            match message.status {
                MessageStatus::Streaming => message.status = MessageStatus::Cancelled,
                MessageStatus::Applied => {
                    applied_keys.insert(message.key(position));
                }
                _ => {}
            }
        }

        Self {
            messages,
            applied_keys,
            ..Self::new(form)
        }
    }

    pub fn with_applier(mut self, applier: FormApplier) -> Self {
        self.applier = applier;
        self
    }

    pub fn with_policy(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn form(&self) -> &FormDocument {
        &self.form
    }

    /// Manual edits made in the builder between turns
    pub fn set_form(&mut self, form: FormDocument) {
        self.form = form;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Pin the badge of future assistant messages; `None` restores automatic classification
    pub fn set_pinned_mode(&mut self, mode: Option<MessageMode>) {
        self.pinned_mode = mode;
    }

    /// Record the user message and open an empty assistant reply.
    ///
    /// Returns the index of the assistant message.
    pub fn begin_turn(&mut self, user_text: &str) -> Result<usize> {
        if self.active.is_some() {
            return Err(ChatError::TurnInFlight);
        }

        self.messages.push(ChatMessage::user(user_text));

        let mut reply = ChatMessage::assistant_streaming();
        reply.pinned_mode = self.pinned_mode;
        reply.thinking = thinking_indicators("");
        self.messages.push(reply);

        let message_index = self.messages.len() - 1;
        self.active = Some(ActiveTurn {
            message_index,
            projector: DisplayProjector::new(),
        });
        debug!("Began assistant turn at message {}", message_index);
        Ok(message_index)
    }

    /// Feed one stream chunk into the open reply
    pub fn push_chunk(&mut self, chunk: &str) -> Result<&ChatMessage> {
        let turn = self.active.as_mut().ok_or(ChatError::NoActiveTurn)?;
        let index = turn.message_index;
        let display = turn.projector.push(chunk).to_string();
        let thinking = thinking_indicators(turn.projector.raw());

        let message = self
            .messages
            .get_mut(index)
            .ok_or(ChatError::MessageNotFound(index))?;
        message.content.push_str(chunk);
        message.display_content = display;
        message.thinking = thinking;
        Ok(message)
    }

    /// Close the open reply and apply its commands
    pub fn complete_turn(&mut self) -> Result<TurnOutcome> {
        let mut turn = self.active.take().ok_or(ChatError::NoActiveTurn)?;
        let index = turn.message_index;
        let display = turn.projector.finish().to_string();

        let message = self
            .messages
            .get_mut(index)
            .ok_or(ChatError::MessageNotFound(index))?;
        transition(index, message, MessageStatus::Completed)?;
        message.display_content = display;
        message.thinking = complete_indicators(&thinking_indicators(&message.content));
        message.mode = Some(classify_mode(&message.content));

        info!(
            "Assistant turn completed at message {} ({} chars)",
            index,
            message.content.len()
        );

        self.apply_message(index)?
            .ok_or(ChatError::InvalidTransition {
                index,
                from: MessageStatus::Applied,
                to: MessageStatus::Applied,
            })
    }

    /// Stop the open reply. Its partial text is kept for display and never applied.
    pub fn cancel_turn(&mut self) -> Result<()> {
        let turn = self.active.take().ok_or(ChatError::NoActiveTurn)?;
        let index = turn.message_index;
        let message = self
            .messages
            .get_mut(index)
            .ok_or(ChatError::MessageNotFound(index))?;
        transition(index, message, MessageStatus::Cancelled)?;
        info!("Assistant turn cancelled at message {}", index);
        Ok(())
    }

    /// Apply the commands of a completed assistant message.
    ///
    /// This is the only Completed -> Applied edge. Returns `Ok(None)` when the
    /// message was already applied, so repeated calls leave the form unchanged.
    pub fn apply_message(&mut self, index: usize) -> Result<Option<TurnOutcome>> {
        let message = self
            .messages
            .get(index)
            .ok_or(ChatError::MessageNotFound(index))?;
        if !message.is_assistant() {
            return Err(ChatError::NotAssistantMessage(index));
        }

        let key = message.key(index);
        if message.status == MessageStatus::Applied || self.applied_keys.contains(&key) {
            debug!("Message {} already applied, skipping", index);
            return Ok(None);
        }
        if message.status != MessageStatus::Completed {
            return Err(ChatError::InvalidTransition {
                index,
                from: message.status,
                to: MessageStatus::Applied,
            });
        }

        let extraction = extract_commands(&message.content);
        let report = self
            .applier
            .apply_all(&self.form, extraction.commands(), self.policy);

        let irrecoverable = extraction.attempted_commands()
            && extraction.has_parse_errors()
            && report.applied == 0;

        let mut diagnostics = extraction.diagnostics;
        diagnostics.extend(report.diagnostics);
        for diagnostic in &diagnostics {
            warn!("Message {}: {}", index, diagnostic);
        }

        if !irrecoverable {
            self.form = report.document;
        }

        let message = self
            .messages
            .get_mut(index)
            .ok_or(ChatError::MessageNotFound(index))?;
        transition(index, message, MessageStatus::Applied)?;
        if extraction.prose.chars().count() > message.display_content.chars().count() {
            message.display_content = extraction.prose;
        }
        self.applied_keys.insert(key);

        if irrecoverable {
            warn!("No command in message {} could be parsed, form left unchanged", index);
            self.messages.push(ChatMessage::assistant_notice(FALLBACK_NOTICE));
        } else {
            info!(
                "Applied {} command(s) from message {} ({} skipped)",
                report.applied, index, report.skipped
            );
        }

        Ok(Some(TurnOutcome {
            message_index: index,
            document: self.form.clone(),
            diagnostics,
            applied: report.applied,
            changed: report.changed && !irrecoverable,
            fallback_notice: irrecoverable,
        }))
    }

    /// Run a whole turn over a stream of text chunks.
    ///
    /// Returns `Ok(None)` when the turn was cancelled. A stream error cancels
    /// the turn and is returned as [`ChatError::Stream`].
    pub async fn run_turn<S, E>(
        &mut self,
        user_text: &str,
        stream: S,
        cancel: &CancelFlag,
    ) -> Result<Option<TurnOutcome>>
    where
        S: Stream<Item = std::result::Result<String, E>>,
        E: Display,
    {
        self.begin_turn(user_text)?;
        pin_mut!(stream);

        loop {
            let step = poll_fn(|cx| {
                if cancel.poll_cancelled(cx).is_ready() {
                    return Poll::Ready(StreamStep::Cancelled);
                }
                stream.as_mut().poll_next(cx).map(|item| match item {
                    Some(item) => StreamStep::Item(item),
                    None => StreamStep::Ended,
                })
            })
            .await;

            let item = match step {
                StreamStep::Item(item) => item,
                StreamStep::Ended => break,
                StreamStep::Cancelled => {
                    debug!("Turn cancelled while waiting on the stream");
                    self.cancel_turn()?;
                    return Ok(None);
                }
            };
            // The item may have arrived together with the cancellation
            if cancel.is_cancelled() {
                self.cancel_turn()?;
                return Ok(None);
            }
            match item {
                Ok(chunk) => {
                    self.push_chunk(&chunk)?;
                }
                Err(e) => {
                    warn!("Assistant stream failed: {}", e);
                    self.cancel_turn()?;
                    return Err(ChatError::Stream(e.to_string()));
                }
            }
        }

        if cancel.is_cancelled() {
            self.cancel_turn()?;
            return Ok(None);
        }
        self.complete_turn().map(Some)
    }
}

fn transition(index: usize, message: &mut ChatMessage, next: MessageStatus) -> Result<()> {
    if !message.status.can_transition_to(next) {
        return Err(ChatError::InvalidTransition {
            index,
            from: message.status,
            to: next,
        });
    }
    message.status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use formpilot_core::{Field, FieldType};
    use formpilot_protocol::SequentialIdGenerator;

    fn session() -> AssistantSession {
        AssistantSession::new(FormDocument::with_title("Feedback"))
            .with_applier(FormApplier::with_id_generator(SequentialIdGenerator::new("gen")))
    }

    #[test]
    fn test_second_turn_rejected_while_streaming() {
        let mut session = session();
        session.begin_turn("hi").unwrap();
        assert_eq!(session.begin_turn("again"), Err(ChatError::TurnInFlight));
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn test_push_without_turn_fails() {
        let mut session = session();
        assert_eq!(session.push_chunk("x").unwrap_err(), ChatError::NoActiveTurn);
    }

    #[test]
    fn test_streaming_message_cannot_be_applied() {
        let mut session = session();
        let index = session.begin_turn("hi").unwrap();
        session.push_chunk("CLEAR_FORM: {}").unwrap();
        assert!(matches!(
            session.apply_message(index),
            Err(ChatError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_user_message_cannot_be_applied() {
        let mut session = session();
        session.begin_turn("hi").unwrap();
        assert_eq!(session.apply_message(0), Err(ChatError::NotAssistantMessage(0)));
    }

    #[test]
    fn test_thinking_tracks_stream() {
        let mut session = session();
        session.begin_turn("add fields").unwrap();
        assert_eq!(session.messages()[1].thinking, vec!["Analyzing...".to_string()]);

        session
            .push_chunk("ADD_FIELD: {\"type\": \"text\", \"label\": \"A\"}")
            .unwrap();
        assert_eq!(session.messages()[1].thinking, vec!["Adding 1 field...".to_string()]);

        session.complete_turn().unwrap();
        assert_eq!(session.messages()[1].thinking, vec!["Added 1 field".to_string()]);
        assert_eq!(session.messages()[1].mode, Some(MessageMode::Execution));
    }

    #[test]
    fn test_restore_marks_interrupted_stream_cancelled() {
        let mut streaming = ChatMessage::assistant_streaming();
        streaming.content = "ADD_FIELD: {".to_string();
        let mut doc = FormDocument::new();
        doc.fields.push(Field::new("a", FieldType::Text, "A"));

        let session = AssistantSession::restore(doc, vec![ChatMessage::user("hi"), streaming]);
        assert_eq!(session.messages()[1].status, MessageStatus::Cancelled);
        assert!(!session.is_streaming());
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiting_task() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        futures::join!(waiter.cancelled(), async {
            tokio::task::yield_now().await;
            flag.cancel();
        });
        assert!(waiter.is_cancelled());
    }
}
