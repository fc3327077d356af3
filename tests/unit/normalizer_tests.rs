//! Unit tests for agent message normalization.
//!
//! Covers the stateless [`normalize_line`] mapping for both wire shapes and
//! the per-invocation [`Normalizer`] state (output accumulation, session
//! surfacing, result filling, and result synthesis).

use serde_json::json;

use agent_bridge::bridge::normalizer::{normalize_line, Normalizer};
use agent_bridge::models::event::{CanonicalEvent, ErrorType};

fn texts(events: &[CanonicalEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            CanonicalEvent::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

// ── Totality ─────────────────────────────────────────────────────────────────

#[test]
fn malformed_lines_are_dropped() {
    for line in [
        "",
        "   ",
        "not json",
        "{\"role\":",
        "[1,2,3]",
        "42",
        "\"just a string\"",
        "{\"unrelated\":true}",
        "{\"role\":7}",
        "{\"type\":42}",
    ] {
        assert!(
            normalize_line(line).is_none(),
            "line {line:?} must normalize to nothing"
        );
    }
}

#[test]
fn recognized_but_irrelevant_messages_produce_no_events() {
    for line in [
        r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
        r#"{"type":"system","subtype":"hook_started"}"#,
        r#"{"type":"stream_event","event":{}}"#,
        r#"{"role":"user","content":"hello"}"#,
    ] {
        let normalized = normalize_line(line);
        assert!(
            normalized.map_or(true, |n| n.events.is_empty()),
            "line {line:?} must not produce events"
        );
    }
}

// ── Shape A: envelope ────────────────────────────────────────────────────────

#[test]
fn system_init_maps_to_init_event() {
    let line = r#"{"type":"system","subtype":"init","session_id":"sess-1","tools":[]}"#;

    let normalized = normalize_line(line).expect("system init is recognized");

    assert_eq!(normalized.session_id.as_deref(), Some("sess-1"));
    assert_eq!(
        normalized.events,
        vec![CanonicalEvent::Init {
            session_id: "sess-1".into()
        }]
    );
}

#[test]
fn assistant_envelope_maps_each_content_item() {
    let line = json!({
        "type": "assistant",
        "message": {
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Looking at the file."},
                {"type": "tool_use", "id": "toolu_1", "name": "Read",
                 "input": {"file_path": "/repo/src/main.rs"}},
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Done."}
            ]
        },
        "session_id": "sess-1"
    })
    .to_string();

    let events = normalize_line(&line).expect("assistant is recognized").events;

    assert_eq!(events.len(), 3, "thinking items must be skipped: {events:?}");
    assert_eq!(events[0], CanonicalEvent::text("Looking at the file."));
    match &events[1] {
        CanonicalEvent::Tool {
            id, name, summary, ..
        } => {
            assert_eq!(id, "toolu_1");
            assert_eq!(name, "Read");
            assert_eq!(summary, "src/main.rs");
        }
        other => panic!("expected tool event, got {other:?}"),
    }
    assert_eq!(events[2], CanonicalEvent::text("Done."));
}

#[test]
fn ask_user_question_maps_to_question_event() {
    let line = json!({
        "type": "assistant",
        "message": {"content": [{
            "type": "tool_use",
            "id": "toolu_q",
            "name": "AskUserQuestion",
            "input": {"questions": [
                {
                    "question": "Which database?",
                    "header": "Storage",
                    "options": [
                        {"label": "Postgres", "description": "Relational"},
                        {"label": "SQLite"}
                    ],
                    "multiSelect": false
                },
                {
                    "question": "Which features?",
                    "options": ["auth", "billing"],
                    "multiSelect": true
                }
            ]}
        }]}
    })
    .to_string();

    let events = normalize_line(&line).expect("recognized").events;

    let CanonicalEvent::Question {
        tool_use_id,
        questions,
    } = &events[0]
    else {
        panic!("expected question event, got {events:?}");
    };
    assert_eq!(tool_use_id, "toolu_q", "question must carry the tool-use id");
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].header.as_deref(), Some("Storage"));
    assert_eq!(questions[0].options[0].label, "Postgres");
    assert_eq!(
        questions[0].options[0].description.as_deref(),
        Some("Relational")
    );
    assert!(!questions[0].multi_select);
    assert_eq!(questions[1].options[1].label, "billing");
    assert!(questions[1].multi_select);
}

#[test]
fn ask_user_question_without_questions_is_reported_as_tool() {
    let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t","name":"AskUserQuestion","input":{}}]}}"#;

    let events = normalize_line(line).expect("recognized").events;

    assert!(
        matches!(&events[0], CanonicalEvent::Tool { name, .. } if name == "AskUserQuestion"),
        "an unusable question call falls back to a tool event: {events:?}"
    );
}

#[test]
fn success_result_maps_to_result_event() {
    let line = r#"{"type":"result","subtype":"success","is_error":false,"result":"All good","session_id":"sess-9"}"#;

    let events = normalize_line(line).expect("recognized").events;

    assert_eq!(
        events,
        vec![CanonicalEvent::Result {
            content: "All good".into(),
            session_id: Some("sess-9".into()),
        }]
    );
}

#[test]
fn failure_subtype_maps_to_agent_error() {
    let line = r#"{"type":"result","subtype":"error_max_turns","result":"Reached max turns"}"#;

    let events = normalize_line(line).expect("recognized").events;

    match &events[0] {
        CanonicalEvent::Error {
            message,
            error_type,
            recoverable,
            details,
        } => {
            assert_eq!(message, "Reached max turns");
            assert_eq!(*error_type, ErrorType::AgentError);
            assert!(!recoverable, "agent errors are not recoverable");
            assert_eq!(details.as_ref(), Some(&json!({"subtype": "error_max_turns"})));
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[test]
fn is_error_flag_wins_over_success_subtype() {
    let line = r#"{"type":"result","subtype":"success","is_error":true,"result":"API error"}"#;
    let events = normalize_line(line).expect("recognized").events;
    assert!(matches!(
        &events[0],
        CanonicalEvent::Error { message, .. } if message == "API error"
    ));
}

#[test]
fn failure_without_body_uses_errors_then_subtype() {
    let with_errors = r#"{"type":"result","subtype":"error_during_execution","errors":["first","second"]}"#;
    let events = normalize_line(with_errors).expect("recognized").events;
    assert!(matches!(
        &events[0],
        CanonicalEvent::Error { message, .. } if message == "first; second"
    ));

    let bare = r#"{"type":"result","subtype":"error_during_execution"}"#;
    let events = normalize_line(bare).expect("recognized").events;
    assert!(matches!(
        &events[0],
        CanonicalEvent::Error { message, .. }
            if message == "agent reported failure (error_during_execution)"
    ));
}

// ── Shape B: flat ────────────────────────────────────────────────────────────

#[test]
fn flat_assistant_message_maps_content() {
    let line = r#"{"role":"assistant","content":[{"type":"text","text":"Hello "}]}"#;

    let normalized = normalize_line(line).expect("flat shape is recognized");

    assert_eq!(normalized.events, vec![CanonicalEvent::text("Hello ")]);
    assert_eq!(normalized.session_id, None);
}

#[test]
fn flat_string_content_maps_to_text() {
    let events = normalize_line(r#"{"role":"assistant","content":"plain"}"#)
        .expect("recognized")
        .events;
    assert_eq!(events, vec![CanonicalEvent::text("plain")]);
}

#[test]
fn flat_tool_use_maps_to_tool_event() {
    let line = r#"{"role":"assistant","content":[{"type":"tool_use","id":"c1","name":"Bash","input":{"command":"cargo fmt --check"}}]}"#;
    let events = normalize_line(line).expect("recognized").events;
    assert!(matches!(
        &events[0],
        CanonicalEvent::Tool { summary, .. } if summary == "cargo fmt --check"
    ));
}

// ── Stateful normalizer ──────────────────────────────────────────────────────

#[test]
fn text_accumulates_into_output() {
    let mut normalizer = Normalizer::new();
    normalizer.push_line(r#"{"role":"assistant","content":[{"type":"text","text":"Hello "}]}"#);
    normalizer.push_line("garbage");
    normalizer.push_line(r#"{"role":"assistant","content":[{"type":"text","text":"world"}]}"#);

    assert_eq!(normalizer.output(), "Hello world");
}

#[test]
fn session_id_is_surfaced_exactly_once() {
    let mut normalizer = Normalizer::new();
    let mut events = Vec::new();

    for line in [
        r#"{"type":"system","subtype":"init","session_id":"sess-1"}"#,
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]},"session_id":"sess-1"}"#,
        r#"{"type":"system","subtype":"init","session_id":"sess-1"}"#,
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"!"}]},"session_id":"sess-2"}"#,
    ] {
        events.extend(normalizer.push_line(line));
    }

    let inits: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, CanonicalEvent::Init { .. }))
        .collect();
    assert_eq!(inits.len(), 1, "init must be surfaced once: {events:?}");
    assert_eq!(normalizer.session_id(), Some("sess-1"), "first id wins");
}

#[test]
fn session_id_on_content_message_surfaces_init_first() {
    let mut normalizer = Normalizer::new();

    let events = normalizer.push_line(
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]},"session_id":"sess-7"}"#,
    );

    assert_eq!(
        events,
        vec![
            CanonicalEvent::Init {
                session_id: "sess-7".into()
            },
            CanonicalEvent::text("hi"),
        ]
    );
}

#[test]
fn session_first_seen_on_result_is_not_duplicated_as_init() {
    let mut normalizer = Normalizer::new();

    let events =
        normalizer.push_line(r#"{"type":"result","subtype":"success","result":"ok","session_id":"s"}"#);

    assert_eq!(
        events,
        vec![CanonicalEvent::Result {
            content: "ok".into(),
            session_id: Some("s".into())
        }]
    );
}

#[test]
fn result_carries_tracked_session_id() {
    let mut normalizer = Normalizer::new();
    normalizer.push_line(r#"{"type":"system","subtype":"init","session_id":"first"}"#);

    let events =
        normalizer.push_line(r#"{"type":"result","subtype":"success","result":"ok","session_id":"other"}"#);

    assert!(matches!(
        &events[0],
        CanonicalEvent::Result { session_id: Some(id), .. } if id == "first"
    ));
}

#[test]
fn empty_result_body_is_filled_from_output() {
    let mut normalizer = Normalizer::new();
    normalizer.push_line(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"streamed"}]}}"#);

    let events = normalizer.push_line(r#"{"type":"result","subtype":"success"}"#);

    assert!(matches!(
        &events[0],
        CanonicalEvent::Result { content, .. } if content == "streamed"
    ));
    assert!(normalizer.saw_result());
}

#[test]
fn synthesized_result_concatenates_text_in_order() {
    let mut normalizer = Normalizer::new();
    let mut events = Vec::new();
    for chunk in ["a", "b", "c"] {
        let line = json!({"role": "assistant", "content": [{"type": "text", "text": chunk}]});
        events.extend(normalizer.push_line(&line.to_string()));
    }
    assert_eq!(texts(&events), vec!["a", "b", "c"]);

    let result = normalizer.synthesize_result();

    assert_eq!(
        result,
        Some(CanonicalEvent::Result {
            content: "abc".into(),
            session_id: None
        })
    );
    assert_eq!(
        normalizer.synthesize_result(),
        None,
        "a result is synthesized at most once"
    );
}

#[test]
fn no_synthesis_after_explicit_result_error_or_empty_output() {
    let mut explicit = Normalizer::new();
    explicit.push_line(r#"{"role":"assistant","content":"x"}"#);
    explicit.push_line(r#"{"type":"result","subtype":"success","result":"x"}"#);
    assert_eq!(explicit.synthesize_result(), None);

    let mut errored = Normalizer::new();
    errored.push_line(r#"{"role":"assistant","content":"x"}"#);
    errored.push_line(r#"{"type":"result","subtype":"error_during_execution"}"#);
    assert!(errored.saw_error());
    assert_eq!(errored.synthesize_result(), None);

    let mut empty = Normalizer::new();
    empty.push_line("not json");
    assert_eq!(empty.synthesize_result(), None);

    let mut recorded = Normalizer::new();
    recorded.push_line(r#"{"role":"assistant","content":"x"}"#);
    recorded.record_error();
    assert_eq!(recorded.synthesize_result(), None);
}
