//! Folding a decoded chat stream into one assistant message.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::StreamExt;

use crate::client_logger::ClientLogger;
use crate::pipeline::PipelineOutcome;
use crate::sse::decode_stream;
use crate::{ChatMessage, StreamEvent};

/// Content given to a turn whose call produced nothing to show.
pub const NO_DATA_MESSAGE: &str = "The server returned no data.";

/// Note added to a turn the caller stopped reading.
pub const INTERRUPTED_MESSAGE: &str = "[response interrupted]";

/// Owns one in-progress assistant message and applies stream events to it in order.
///
/// Every way of finishing a turn leaves the message with non-empty content.
pub struct ChatTurnAssembler {
    message: ChatMessage,
    finished: bool,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl ChatTurnAssembler {
    /// Starts a turn; `searching` should be true when retrieval was requested.
    pub fn new(searching: bool) -> Self {
        Self::from_message(ChatMessage::assistant_pending(searching))
    }

    /// Continues filling an existing assistant message.
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            message,
            finished: false,
            logger: None,
        }
    }

    /// Reports every applied event and the finished turn to `logger`.
    pub fn with_logger(mut self, logger: Option<Arc<dyn ClientLogger>>) -> Self {
        self.logger = logger;
        self
    }

    /// The message as assembled so far.
    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    /// True once the stream's end marker was applied.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Applies one event. Events after [`StreamEvent::Done`] are ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        if self.finished {
            return;
        }
        if let Some(logger) = &self.logger {
            logger.log_stream_event(event);
        }
        match event {
            StreamEvent::ContentDelta(text) => {
                self.message.searching = false;
                self.message.content.push_str(text);
            }
            StreamEvent::SearchEnd(sources) => {
                self.message.searching = false;
                self.message.sources = sources.clone();
            }
            StreamEvent::Malformed(_) => {}
            StreamEvent::Done => self.finished = true,
        }
    }

    /// Ends the turn early with `note`, keeping whatever text already arrived.
    pub fn interrupt(&mut self, note: &str) {
        if self.message.content.is_empty() {
            self.message.content = note.to_string();
        } else {
            self.message.content.push_str("\n\n");
            self.message.content.push_str(note);
        }
        self.finished = true;
    }

    /// Replaces the content with `text` and ends the turn.
    pub fn fail(&mut self, text: impl Into<String>) {
        self.message.content = text.into();
        self.finished = true;
    }

    /// Finalizes the turn and hands back the message.
    pub fn finish(mut self) -> ChatMessage {
        self.message.searching = false;
        if self.message.content.is_empty() {
            self.message.content = NO_DATA_MESSAGE.to_string();
        }
        self.finished = true;
        if let Some(logger) = &self.logger {
            logger.log_turn(&self.message);
        }
        self.message
    }

    /// Drives a whole turn from a pipeline outcome.
    pub async fn run(self, outcome: PipelineOutcome) -> ChatMessage {
        self.run_observed(outcome, |_, _| ControlFlow::Continue(()))
            .await
    }

    /// Drives a whole turn, calling `observe` after each applied event.
    ///
    /// Returning [`ControlFlow::Break`] abandons the rest of the stream; the turn keeps
    /// what it received plus an interruption note.
    pub async fn run_observed<F>(mut self, outcome: PipelineOutcome, mut observe: F) -> ChatMessage
    where
        F: FnMut(&StreamEvent, &ChatMessage) -> ControlFlow<()>,
    {
        let body = match outcome {
            PipelineOutcome::Stream(body) => body,
            other => {
                let text = other
                    .user_message()
                    .unwrap_or_else(|| NO_DATA_MESSAGE.to_string());
                self.fail(text);
                return self.finish();
            }
        };
        let mut events = Box::pin(decode_stream(body));
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    self.apply(&event);
                    if observe(&event, &self.message).is_break() {
                        self.interrupt(INTERRUPTED_MESSAGE);
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "chat stream failed");
                    self.interrupt(&format!("[response interrupted: {err}]"));
                    break;
                }
            }
        }
        self.finish()
    }
}
