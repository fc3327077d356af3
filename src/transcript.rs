//! Folding an event stream into a caller-side record.
//!
//! The bridge itself keeps no history. [`Transcript`] is the reference
//! consumer: it accumulates what a UI or persistence layer typically keeps
//! (output text, final result, session id, open questions, tool activity)
//! and reconstructs [`ToolExecution`] records from `tool` events.

use serde::Serialize;

use crate::bridge::EventStream;
use crate::models::event::{CanonicalEvent, ErrorType, Question};
use crate::models::tool::{ToolExecution, ToolStatus};

/// A `question` event awaiting an answer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuestion {
    /// Tool call the answer must be correlated with.
    pub tool_use_id: String,
    /// Questions asked in that call.
    pub questions: Vec<Question>,
}

/// An `error` event as recorded by the transcript.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedError {
    /// Error class.
    pub error_type: ErrorType,
    /// Human-readable message.
    pub message: String,
    /// Whether the error was advisory.
    pub recoverable: bool,
}

/// Everything observed during one invocation.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Concatenated `text` payloads in arrival order.
    pub text: String,
    /// Content of the `result` event, if one arrived.
    pub result: Option<String>,
    /// Session id surfaced by `init` or `result`.
    pub session_id: Option<String>,
    /// Errors in arrival order.
    pub errors: Vec<RecordedError>,
    /// Questions in arrival order.
    pub questions: Vec<PendingQuestion>,
    /// Tool activity in arrival order.
    pub tools: Vec<ToolExecution>,
    /// Whether the closing `done` was observed.
    pub done: bool,
}

impl Transcript {
    /// Empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `events` to completion and return the transcript.
    pub async fn collect(mut events: EventStream) -> Self {
        let mut transcript = Self::new();
        while let Some(event) = events.next_event().await {
            transcript.observe(&event);
            if event.is_done() {
                break;
            }
        }
        transcript
    }

    /// Fold one event into the transcript.
    pub fn observe(&mut self, event: &CanonicalEvent) {
        if event.is_done() {
            self.finish();
            return;
        }

        // Any later event means the agent moved past earlier tool calls.
        self.settle_running(ToolStatus::Completed);

        match event {
            CanonicalEvent::Init { session_id } => {
                self.session_id.get_or_insert_with(|| session_id.clone());
            }
            CanonicalEvent::Text { content } => self.text.push_str(content),
            CanonicalEvent::Tool { .. } => {
                self.tools.extend(ToolExecution::from_event(event));
            }
            CanonicalEvent::Question {
                tool_use_id,
                questions,
            } => self.questions.push(PendingQuestion {
                tool_use_id: tool_use_id.clone(),
                questions: questions.clone(),
            }),
            CanonicalEvent::Result {
                content,
                session_id,
            } => {
                self.result = Some(content.clone());
                if let Some(id) = session_id {
                    self.session_id.get_or_insert_with(|| id.clone());
                }
            }
            CanonicalEvent::Error {
                message,
                error_type,
                recoverable,
                ..
            } => self.errors.push(RecordedError {
                error_type: *error_type,
                message: message.clone(),
                recoverable: *recoverable,
            }),
            CanonicalEvent::Done => {}
        }
    }

    /// Final text: the result content if present, otherwise the streamed text.
    #[must_use]
    pub fn final_text(&self) -> &str {
        self.result.as_deref().unwrap_or(&self.text)
    }

    /// A result arrived and no non-recoverable error did.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_some() && self.errors.iter().all(|e| e.recoverable)
    }

    fn finish(&mut self) {
        self.done = true;
        let status = if self.result.is_some() {
            ToolStatus::Completed
        } else {
            ToolStatus::Interrupted
        };
        self.settle_running(status);
    }

    fn settle_running(&mut self, status: ToolStatus) {
        for tool in self.tools.iter_mut().filter(|t| t.is_running()) {
            tool.status = status;
        }
    }
}
