//! End-to-end event sequences from simulated agents.

use agent_bridge::bridge::Bridge;
use agent_bridge::config::BridgeConfig;
use agent_bridge::models::event::CanonicalEvent;
use agent_bridge::{extract_review, Transcript};

use super::test_helpers::{bridge_with, kinds, request, run_to_end, script_bridge, script_profile};

#[tokio::test]
async fn flat_text_stream_yields_text_then_synthesized_result() {
    let bridge = script_bridge(
        r#"
printf '%s\n' '{"role":"assistant","content":[{"type":"text","text":"Hello "}]}'
printf '%s\n' '{"role":"assistant","content":[{"type":"text","text":"world"}]}'
"#,
    );
    let (_dir, req) = request("greet");

    let events = run_to_end(&bridge, req).await;

    assert_eq!(
        events,
        vec![
            CanonicalEvent::text("Hello "),
            CanonicalEvent::text("world"),
            CanonicalEvent::Result {
                content: "Hello world".into(),
                session_id: None,
            },
            CanonicalEvent::Done,
        ]
    );
}

#[tokio::test]
async fn envelope_stream_surfaces_session_and_explicit_result() {
    let bridge = script_bridge(
        r#"
printf '%s\n' '{"type":"system","subtype":"init","session_id":"sess-abc","tools":[]}'
printf '%s\n' '{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Working"}]},"session_id":"sess-abc"}'
printf '%s\n' '{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"x","content":"ok"}]},"session_id":"sess-abc"}'
printf '%s\n' '{"type":"result","subtype":"success","result":"All done","session_id":"sess-abc"}'
"#,
    );
    let (_dir, req) = request("work");

    let events = run_to_end(&bridge, req).await;

    assert_eq!(
        events,
        vec![
            CanonicalEvent::Init {
                session_id: "sess-abc".into()
            },
            CanonicalEvent::text("Working"),
            CanonicalEvent::Result {
                content: "All done".into(),
                session_id: Some("sess-abc".into()),
            },
            CanonicalEvent::Done,
        ],
        "an explicit result must not be followed by a synthesized one"
    );
}

#[tokio::test]
async fn repeated_session_id_is_surfaced_once() {
    let bridge = script_bridge(
        r#"
printf '%s\n' '{"type":"system","subtype":"init","session_id":"s-1"}'
printf '%s\n' '{"type":"system","subtype":"init","session_id":"s-1"}'
printf '%s\n' '{"type":"assistant","message":{"content":"hi"},"session_id":"s-1"}'
printf '%s\n' '{"type":"result","subtype":"success","result":"hi","session_id":"s-1"}'
"#,
    );
    let (_dir, req) = request("hi");

    let events = run_to_end(&bridge, req).await;

    let inits = events
        .iter()
        .filter(|e| matches!(e, CanonicalEvent::Init { .. }))
        .count();
    assert_eq!(inits, 1, "session must be surfaced exactly once: {events:?}");
}

#[tokio::test]
async fn malformed_and_irrelevant_lines_do_not_end_the_stream() {
    let bridge = script_bridge(
        r#"
echo 'not json at all'
echo ''
echo '{"unrelated":true}'
printf '%s\n' '{"role":"assistant","content":"survived"}'
"#,
    );
    let (_dir, req) = request("go");

    let events = run_to_end(&bridge, req).await;

    assert_eq!(kinds(&events), vec!["text", "result", "done"]);
}

#[tokio::test]
async fn lines_split_across_writes_are_reassembled() {
    let bridge = script_bridge(
        r#"
printf '{"role":"assistant","con'
sleep 0.2
printf 'tent":"joined ✓"}\n'
"#,
    );
    let (_dir, req) = request("go");

    let events = run_to_end(&bridge, req).await;

    assert_eq!(events[0], CanonicalEvent::text("joined ✓"));
}

#[tokio::test]
async fn trailing_line_without_newline_is_processed() {
    let bridge = script_bridge(r#"printf '%s' '{"role":"assistant","content":"no newline"}'"#);
    let (_dir, req) = request("go");

    let events = run_to_end(&bridge, req).await;

    assert_eq!(events[0], CanonicalEvent::text("no newline"));
}

#[tokio::test]
async fn tool_and_question_events_are_emitted_in_order() {
    let bridge = script_bridge(
        r#"
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls -la"}}]}}'
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"tool_use","id":"q1","name":"AskUserQuestion","input":{"questions":[{"question":"Continue?","options":["yes","no"]}]}}]}}'
"#,
    );
    let (_dir, req) = request("go");

    let events = run_to_end(&bridge, req).await;

    assert_eq!(kinds(&events), vec!["tool", "question", "done"]);
    assert!(matches!(
        &events[0],
        CanonicalEvent::Tool { summary, .. } if summary == "ls -la"
    ));
    assert!(matches!(
        &events[1],
        CanonicalEvent::Question { tool_use_id, .. } if tool_use_id == "q1"
    ));
}

#[tokio::test]
async fn slow_consumer_with_tiny_buffer_sees_every_event_in_order() {
    let mut config = BridgeConfig::default();
    config.event_buffer = 1;
    config.agents.insert(
        "counter".into(),
        script_profile(
            r#"
i=0
while [ $i -lt 40 ]; do
  printf '{"role":"assistant","content":"%s,"}\n' "$i"
  i=$((i+1))
done
"#,
        ),
    );
    config.default_agent = "counter".into();
    let bridge = Bridge::new(config);
    let (_dir, req) = request("count");

    let invocation = bridge
        .start(req, &tokio_util::sync::CancellationToken::new())
        .expect("starts");
    let mut events = invocation.events;
    let mut seen = Vec::new();
    while let Some(event) = events.next_event().await {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let done = event.is_done();
        seen.push(event);
        if done {
            break;
        }
    }

    let texts: Vec<String> = seen
        .iter()
        .filter_map(|e| match e {
            CanonicalEvent::Text { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    let expected: Vec<String> = (0..40).map(|i| format!("{i},")).collect();
    assert_eq!(texts, expected, "backpressure must not drop or reorder events");
    assert_eq!(kinds(&seen[40..]), vec!["result", "done"]);
}

#[tokio::test]
async fn profile_environment_and_working_directory_reach_the_agent() {
    let mut profile = script_profile(
        r#"printf '{"role":"assistant","content":"%s|%s"}\n' "$BRIDGE_TEST_VAR" "$(pwd)""#,
    );
    profile
        .env
        .insert("BRIDGE_TEST_VAR".into(), "from-profile".into());
    let bridge = bridge_with(profile);
    let (dir, req) = request("env");

    let events = run_to_end(&bridge, req).await;

    let cwd = dir.path().canonicalize().expect("canonical tempdir");
    assert_eq!(
        events[0],
        CanonicalEvent::text(format!("from-profile|{}", cwd.display()))
    );
}

#[tokio::test]
async fn transcript_and_review_extraction_over_a_live_stream() {
    let bridge = script_bridge(
        r#"
printf '%s\n' '{"type":"system","subtype":"init","session_id":"rev-1"}'
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"src/lib.rs"}}]},"session_id":"rev-1"}'
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"text","text":"```json\n{\"score\": 72, \"summary\": \"Solid\", \"concerns\": [\"naming\"]}\n```"}]},"session_id":"rev-1"}'
"#,
    );
    let (_dir, req) = request("review this");

    let invocation = bridge
        .start(req, &tokio_util::sync::CancellationToken::new())
        .expect("starts");
    let transcript = tokio::time::timeout(
        super::test_helpers::STREAM_DEADLINE,
        Transcript::collect(invocation.events),
    )
    .await
    .expect("transcript completes");

    assert!(transcript.done);
    assert!(transcript.succeeded());
    assert_eq!(transcript.session_id.as_deref(), Some("rev-1"));
    assert_eq!(transcript.tools.len(), 1);

    let review = extract_review(transcript.final_text()).expect("review block");
    assert_eq!(review.score, 72);
    assert_eq!(review.summary, "Solid");
    assert_eq!(review.concerns, vec!["naming".to_owned()]);
}
