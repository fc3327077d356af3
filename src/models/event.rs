//! Canonical event taxonomy emitted by the bridge.
//!
//! Every agent wire shape is normalized into [`CanonicalEvent`]. The serde
//! representation is internally tagged on `type` with camelCase payload
//! fields, so an event serializes as e.g.
//! `{"type":"question","toolUseId":"toolu_1","questions":[…]}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification carried by [`CanonicalEvent::Error`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The agent binary could not be launched.
    SpawnError,
    /// The agent reported failure through its own result message.
    AgentError,
    /// The agent wrote unexpected output to stderr.
    StderrWarning,
    /// Reading the agent's output streams failed.
    IoError,
    /// The agent exited unsuccessfully without reporting a result.
    ProcessExit,
}

impl ErrorType {
    /// Whether a caller may reasonably treat this error as advisory.
    ///
    /// Only stderr noise is recoverable; every other class means the
    /// invocation produced no trustworthy result.
    #[must_use]
    pub fn recoverable(self) -> bool {
        matches!(self, Self::StderrWarning)
    }
}

/// One selectable answer offered by a [`Question`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    /// Short label shown to the user.
    pub label: String,
    /// Optional longer explanation of the option.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A structured question the agent is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The question text.
    pub question: String,
    /// Optional short header/category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Offered options; empty means free-form input.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// Whether more than one option may be selected.
    #[serde(default)]
    pub multi_select: bool,
}

/// Agent-agnostic event produced by an invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CanonicalEvent {
    /// The agent announced its session identifier.
    Init {
        /// Opaque session handle usable for later resumption.
        session_id: String,
    },
    /// Incremental natural-language output.
    Text {
        /// Text fragment; fragments concatenate in arrival order.
        content: String,
    },
    /// The agent invoked a tool.
    Tool {
        /// Tool-use correlation identifier.
        id: String,
        /// Tool name as reported by the agent.
        name: String,
        /// Short human-readable summary of the invocation.
        summary: String,
        /// Time the bridge observed the invocation.
        timestamp: DateTime<Utc>,
    },
    /// The agent is blocked on structured user input.
    Question {
        /// Correlation id to use when answering in-band.
        tool_use_id: String,
        /// Questions asked in this batch.
        questions: Vec<Question>,
    },
    /// Terminal successful completion.
    Result {
        /// Full output relevant to the caller.
        content: String,
        /// Session identifier, when one has been seen.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Terminal or advisory failure.
    Error {
        /// Human-readable message.
        message: String,
        /// Failure class.
        error_type: ErrorType,
        /// Whether the failure may be ignored.
        recoverable: bool,
        /// Optional structured context.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    /// Stream-closed marker; always last.
    Done,
}

impl CanonicalEvent {
    /// Build an incremental text event.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Build an error event whose `recoverable` flag follows its class.
    #[must_use]
    pub fn error(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            error_type,
            recoverable: error_type.recoverable(),
            details: None,
        }
    }

    /// Build an error event carrying structured details.
    #[must_use]
    pub fn error_with_details(
        error_type: ErrorType,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self::Error {
            message: message.into(),
            error_type,
            recoverable: error_type.recoverable(),
            details: Some(details),
        }
    }

    /// Wire tag of this event (`init`, `text`, …).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Text { .. } => "text",
            Self::Tool { .. } => "tool",
            Self::Question { .. } => "question",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Whether this is the closing [`CanonicalEvent::Done`] marker.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
