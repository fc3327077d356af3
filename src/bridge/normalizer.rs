//! Agent stdout message normalization.
//!
//! Two wire shapes are accepted verbatim:
//!
//! | Shape | Example                                                                  |
//! |-------|--------------------------------------------------------------------------|
//! | A     | `{"type":"assistant","message":{"role":"assistant","content":[…]},"session_id":"…"}` |
//! | B     | `{"role":"assistant","content":[…]}`                                     |
//!
//! [`normalize_line`] is a pure tagged-variant parse: Shape A is tried first
//! (it requires a string `type`), then Shape B (it requires `role`); the
//! first structural match wins and each shape is mapped by its own function.
//! [`Normalizer`] layers the per-invocation state on top: the accumulated
//! output buffer, the [`SessionTracker`], and the result/error flags used
//! for end-of-stream bookkeeping.
//!
//! # Envelope types (Shape A)
//!
//! | `type`      | Maps to                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `system`    | `init` when `subtype` is `init`; otherwise nothing        |
//! | `assistant` | `text` / `tool` / `question` per content item             |
//! | `user`      | nothing (tool results echoed back by the agent)           |
//! | `result`    | `result`, or `error` for `is_error` / `error*` subtypes   |
//! | *(other)*   | nothing                                                   |

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::bridge::tool_summary::{summarize_tool, ASK_USER_QUESTION_TOOL};
use crate::bridge::tracker::SessionTracker;
use crate::models::event::{CanonicalEvent, ErrorType, Question, QuestionOption};

// ── Wire shapes ───────────────────────────────────────────────────────────────

/// Shape A: envelope-wrapped message.
#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<MessageBody>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    session_id: Value,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    is_error: Option<bool>,
    #[serde(default)]
    errors: Value,
}

/// Inner `message` of a Shape A envelope.
#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    content: Value,
}

/// Shape B: flat role/content message.
#[derive(Debug, Deserialize)]
struct FlatMessage {
    role: String,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    session_id: Value,
}

/// One item of a `content` array.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentItem {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

// ── Stateless mapping ─────────────────────────────────────────────────────────

/// Events recognized on one line, before per-invocation state is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLine {
    /// Session id carried by the message, if any.
    pub session_id: Option<String>,
    /// Events in content order; empty for recognized-but-irrelevant messages.
    pub events: Vec<CanonicalEvent>,
}

/// Map one raw stdout line to the events it denotes.
///
/// Returns `None` when the line is blank, is not JSON, or is JSON matching
/// neither wire shape. Never panics.
#[must_use]
pub fn normalize_line(line: &str) -> Option<NormalizedLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value: Value = serde_json::from_str(trimmed).ok()?;

    match EnvelopeMessage::deserialize(&value) {
        Ok(envelope) if ENVELOPE_KINDS.contains(&envelope.kind.as_str()) => {
            return Some(envelope_events(envelope));
        }
        // A `type` we do not map may still sit on a flat role/content body.
        Ok(envelope) => {
            return Some(FlatMessage::deserialize(&value).map_or_else(
                |_| NormalizedLine {
                    session_id: string_value(&envelope.session_id),
                    events: Vec::new(),
                },
                flat_events,
            ));
        }
        Err(_) => {}
    }

    FlatMessage::deserialize(&value).ok().map(flat_events)
}

/// Envelope `type` values with a defined mapping.
const ENVELOPE_KINDS: &[&str] = &["system", "assistant", "user", "result"];

fn envelope_events(envelope: EnvelopeMessage) -> NormalizedLine {
    let session_id = string_value(&envelope.session_id);

    let events = match envelope.kind.as_str() {
        "system" => match (envelope.subtype.as_deref(), &session_id) {
            (Some("init"), Some(id)) => vec![CanonicalEvent::Init {
                session_id: id.clone(),
            }],
            _ => Vec::new(),
        },
        "assistant" => envelope
            .message
            .map(|body| content_events(&body.content))
            .unwrap_or_default(),
        "result" => vec![result_event(&envelope, session_id.clone())],
        _ => Vec::new(),
    };

    NormalizedLine { session_id, events }
}

fn flat_events(flat: FlatMessage) -> NormalizedLine {
    let events = if flat.role == "assistant" {
        content_events(&flat.content)
    } else {
        Vec::new()
    };

    NormalizedLine {
        session_id: string_value(&flat.session_id),
        events,
    }
}

fn result_event(envelope: &EnvelopeMessage, session_id: Option<String>) -> CanonicalEvent {
    let body = string_value(&envelope.result);
    let subtype = envelope.subtype.as_deref().unwrap_or("success");
    let failed = envelope.is_error.unwrap_or(false) || subtype.starts_with("error");

    if !failed {
        return CanonicalEvent::Result {
            content: body.unwrap_or_default(),
            session_id,
        };
    }

    let message = body
        .or_else(|| joined_errors(&envelope.errors))
        .unwrap_or_else(|| format!("agent reported failure ({subtype})"));

    CanonicalEvent::error_with_details(
        ErrorType::AgentError,
        message,
        json!({ "subtype": subtype }),
    )
}

fn content_events(content: &Value) -> Vec<CanonicalEvent> {
    match content {
        Value::String(text) if !text.is_empty() => vec![CanonicalEvent::text(text.clone())],
        Value::Array(items) => items.iter().filter_map(item_event).collect(),
        _ => Vec::new(),
    }
}

fn item_event(item: &Value) -> Option<CanonicalEvent> {
    match ContentItem::deserialize(item).ok()? {
        ContentItem::Text { text } if !text.is_empty() => Some(CanonicalEvent::text(text)),
        ContentItem::ToolUse { id, name, input } => Some(tool_event(id, name, &input)),
        ContentItem::Text { .. } | ContentItem::Other => None,
    }
}

fn tool_event(id: String, name: String, input: &Value) -> CanonicalEvent {
    if name == ASK_USER_QUESTION_TOOL {
        if let Some(questions) = parse_questions(input) {
            return CanonicalEvent::Question {
                tool_use_id: id,
                questions,
            };
        }
    }

    CanonicalEvent::Tool {
        summary: summarize_tool(&name, input),
        id,
        name,
        timestamp: Utc::now(),
    }
}

/// Parse the `questions` array of an ask-user-question tool input.
///
/// Entries without question text are skipped; options may be plain strings
/// or `{label, description}` objects. Returns `None` when nothing usable
/// remains so the call is reported as an ordinary tool.
fn parse_questions(input: &Value) -> Option<Vec<Question>> {
    let questions: Vec<Question> = input
        .get("questions")?
        .as_array()?
        .iter()
        .filter_map(parse_question)
        .collect();

    (!questions.is_empty()).then_some(questions)
}

fn parse_question(raw: &Value) -> Option<Question> {
    let question = raw.get("question").and_then(Value::as_str)?.to_owned();
    let header = raw
        .get("header")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let options = raw
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| opts.iter().filter_map(parse_option).collect())
        .unwrap_or_default();
    let multi_select = raw
        .get("multiSelect")
        .or_else(|| raw.get("multi_select"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(Question {
        question,
        header,
        options,
        multi_select,
    })
}

fn parse_option(raw: &Value) -> Option<QuestionOption> {
    match raw {
        Value::String(label) => Some(QuestionOption {
            label: label.clone(),
            description: None,
        }),
        Value::Object(_) => Some(QuestionOption {
            label: raw.get("label").and_then(Value::as_str)?.to_owned(),
            description: raw
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }),
        _ => None,
    }
}

fn string_value(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
}

fn joined_errors(errors: &Value) -> Option<String> {
    let parts: Vec<String> = errors
        .as_array()?
        .iter()
        .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_owned))
        .collect();
    (!parts.is_empty()).then(|| parts.join("; "))
}

// ── Stateful normalizer ───────────────────────────────────────────────────────

/// Per-invocation normalizer state.
///
/// Feeds each line through [`normalize_line`], then:
///
/// - appends `text` payloads and result bodies to the accumulated output;
/// - surfaces the first session id exactly once, as an `init` event (or via
///   the `result` event when that is where it first appears);
/// - fills empty result bodies from the accumulated output;
/// - remembers whether a `result` or `error` was emitted.
#[derive(Debug, Default)]
pub struct Normalizer {
    output: String,
    tracker: SessionTracker,
    saw_result: bool,
    saw_error: bool,
}

impl Normalizer {
    /// Create a fresh normalizer for one invocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one line, applying invocation state.
    ///
    /// Returns no events for blank, malformed, or irrelevant lines.
    pub fn push_line(&mut self, line: &str) -> Vec<CanonicalEvent> {
        let Some(normalized) = normalize_line(line) else {
            if !line.trim().is_empty() {
                debug!(line_len = line.len(), "normalizer: skipping unrecognized line");
            }
            return Vec::new();
        };

        let captured = self
            .tracker
            .observe(normalized.session_id.as_deref())
            .map(str::to_owned);

        let announces_inline = normalized.events.iter().any(|e| {
            matches!(
                e,
                CanonicalEvent::Init { .. } | CanonicalEvent::Result { .. }
            )
        });

        let mut out = Vec::with_capacity(normalized.events.len() + 1);
        if let Some(id) = captured.as_ref().filter(|_| !announces_inline) {
            out.push(CanonicalEvent::Init {
                session_id: id.clone(),
            });
        }

        for event in normalized.events {
            match event {
                CanonicalEvent::Init { .. } => {
                    if let Some(id) = captured.as_ref() {
                        out.push(CanonicalEvent::Init {
                            session_id: id.clone(),
                        });
                    }
                }
                CanonicalEvent::Text { content } => {
                    self.output.push_str(&content);
                    out.push(CanonicalEvent::Text { content });
                }
                CanonicalEvent::Result { content, .. } => {
                    self.output.push_str(&content);
                    self.saw_result = true;
                    let content = if content.is_empty() {
                        self.output.clone()
                    } else {
                        content
                    };
                    out.push(CanonicalEvent::Result {
                        content,
                        session_id: self.tracker.session_id().map(str::to_owned),
                    });
                }
                event @ CanonicalEvent::Error { .. } => {
                    self.saw_error = true;
                    out.push(event);
                }
                other => out.push(other),
            }
        }

        out
    }

    /// Build the synthesized terminal result, if one is owed.
    ///
    /// A result is synthesized only when the stream produced output but
    /// neither a `result` nor an `error`.
    pub fn synthesize_result(&mut self) -> Option<CanonicalEvent> {
        if self.saw_result || self.saw_error || self.output.is_empty() {
            return None;
        }

        self.saw_result = true;
        Some(CanonicalEvent::Result {
            content: self.output.clone(),
            session_id: self.tracker.session_id().map(str::to_owned),
        })
    }

    /// Record an error raised outside the stream (I/O, exit status).
    pub fn record_error(&mut self) {
        self.saw_error = true;
    }

    /// Accumulated text output so far.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Session id captured so far.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.tracker.session_id()
    }

    /// Whether a `result` (explicit or synthesized) was produced.
    #[must_use]
    pub fn saw_result(&self) -> bool {
        self.saw_result
    }

    /// Whether an `error` was produced.
    #[must_use]
    pub fn saw_error(&self) -> bool {
        self.saw_error
    }
}
