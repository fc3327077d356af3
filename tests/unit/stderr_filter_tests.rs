//! Unit tests for stderr capture and benign-line filtering.

use agent_bridge::bridge::stderr::{collect_stderr, StderrFilter, MAX_STDERR_BYTES};

fn default_filter() -> StderrFilter {
    StderrFilter::new(&[r"(?i)^\s*model selected\b".to_owned()])
}

#[test]
fn blank_stderr_is_not_meaningful() {
    assert_eq!(default_filter().meaningful(""), None);
    assert_eq!(default_filter().meaningful("  \n\t\n"), None);
}

#[test]
fn benign_banner_is_filtered() {
    assert_eq!(default_filter().meaningful("Model selected: sonnet\n"), None);
    assert_eq!(default_filter().meaningful("  model selected\n"), None);
}

#[test]
fn other_lines_survive_and_keep_order() {
    let stderr = "Model selected: sonnet\nwarning: rate limited\n\nretrying\n";
    assert_eq!(
        default_filter().meaningful(stderr).as_deref(),
        Some("warning: rate limited\nretrying")
    );
}

#[test]
fn none_filter_keeps_everything_non_blank() {
    assert_eq!(
        StderrFilter::none().meaningful("Model selected: x\n").as_deref(),
        Some("Model selected: x")
    );
}

#[test]
fn invalid_patterns_are_skipped() {
    let filter = StderrFilter::new(&["(unclosed".to_owned(), "^debug:".to_owned()]);
    assert_eq!(filter.meaningful("debug: x\nreal\n").as_deref(), Some("real"));
}

#[tokio::test]
async fn collect_reads_to_eof() {
    let input: &[u8] = b"line one\nline two\n";
    assert_eq!(collect_stderr(input).await, "line one\nline two\n");
}

#[tokio::test]
async fn collect_caps_retained_bytes() {
    let big = vec![b'x'; MAX_STDERR_BYTES + 10_000];
    let kept = collect_stderr(big.as_slice()).await;
    assert_eq!(kept.len(), MAX_STDERR_BYTES);
}
