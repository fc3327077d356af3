//! Layered extraction of a review payload from completion text.
//!
//! Agents are only loosely instructed to answer with JSON, so the payload may
//! be wrapped in prose, markdown, or several fenced blocks. Strategies run in
//! a fixed order and the first candidate that parses as a JSON object wins:
//!
//! 1. A fenced block tagged `json`.
//! 2. Any fenced block.
//! 3. The smallest brace-balanced object that mentions both `"score"` and
//!    `"summary"`.
//! 4. The first brace-balanced object whose parsed `score` is numeric
//!    (disabled by [`Extractor::strict`]).
//!
//! Field validation happens after selection, so a `json` block with a bad
//! score still beats a later block with a good one.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::review::{ReviewResult, DEFAULT_SCORE, PLACEHOLDER_SUMMARY};

const MAX_SCORE: f64 = 100.0;
const SCORE_KEY: &str = "\"score\"";
const SUMMARY_KEY: &str = "\"summary\"";

/// Review payload extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extractor {
    bare_objects: bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    /// Extractor running all four strategies.
    #[must_use]
    pub fn new() -> Self {
        Self { bare_objects: true }
    }

    /// Extractor without the bare-object fallback: text must contain a fenced
    /// block or an object naming both `score` and `summary`.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            bare_objects: false,
        }
    }

    /// Recover a [`ReviewResult`] from `text`, or `None` if no strategy finds
    /// a JSON object.
    #[must_use]
    pub fn extract(&self, text: &str) -> Option<ReviewResult> {
        let (strategy, object) = self.find_object(text)?;
        debug!(strategy, "review payload extracted");
        Some(into_review(&object, text))
    }

    fn find_object(&self, text: &str) -> Option<(&'static str, Map<String, Value>)> {
        if let Some(obj) = json_fences(text).find_map(parse_object) {
            return Some(("json_fence", obj));
        }
        if let Some(obj) = any_fences(text).find_map(parse_fence_body) {
            return Some(("fence", obj));
        }

        let spans = object_spans(text);
        if let Some(obj) = keyed_object(text, &spans) {
            return Some(("keyed_object", obj));
        }
        if self.bare_objects {
            let obj = spans
                .iter()
                .filter_map(|&(start, end)| parse_object(&text[start..end]))
                .find(|obj| obj.get("score").is_some_and(Value::is_number));
            if let Some(obj) = obj {
                return Some(("scored_object", obj));
            }
        }
        None
    }
}

/// Extract with the default (non-strict) [`Extractor`].
#[must_use]
pub fn extract_review(text: &str) -> Option<ReviewResult> {
    Extractor::new().extract(text)
}

// ── Candidate discovery ───────────────────────────────────────────────────────

fn json_fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*(?i:json)\b(.*?)```").ok())
        .as_ref()
}

fn any_fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(.*?)```").ok()).as_ref()
}

fn json_fences(text: &str) -> impl Iterator<Item = &str> {
    fence_bodies(json_fence_re(), text)
}

fn any_fences(text: &str) -> impl Iterator<Item = &str> {
    fence_bodies(any_fence_re(), text)
}

fn fence_bodies<'t>(re: Option<&'static Regex>, text: &'t str) -> impl Iterator<Item = &'t str> {
    re.into_iter()
        .flat_map(move |re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// A generic fence may open with an info string (```` ```ts ````); retry
/// without its first line.
fn parse_fence_body(body: &str) -> Option<Map<String, Value>> {
    parse_object(body).or_else(|| {
        body.split_once('\n')
            .and_then(|(_, rest)| parse_object(rest))
    })
}

fn keyed_object(text: &str, spans: &[(usize, usize)]) -> Option<Map<String, Value>> {
    let scores = key_offsets(text, SCORE_KEY);
    let summaries = key_offsets(text, SUMMARY_KEY);
    let mut keyed: Vec<(usize, usize)> = spans
        .iter()
        .copied()
        .filter(|&span| {
            mentions(&scores, span, SCORE_KEY.len())
                && mentions(&summaries, span, SUMMARY_KEY.len())
        })
        .collect();
    keyed.sort_by_key(|&(start, end)| end - start);
    keyed
        .into_iter()
        .find_map(|(start, end)| parse_object(&text[start..end]))
}

fn key_offsets(text: &str, key: &str) -> Vec<usize> {
    text.match_indices(key).map(|(idx, _)| idx).collect()
}

/// Whether an occurrence from the sorted `offsets` lies wholly inside `span`.
fn mentions(offsets: &[usize], (start, end): (usize, usize), len: usize) -> bool {
    let first = offsets.partition_point(|&offset| offset < start);
    offsets.get(first).is_some_and(|&offset| offset + len <= end)
}

/// Byte ranges of every brace-balanced `{…}` in `text`, in start order.
///
/// Single pass over a stack of open-brace offsets. Quotes open string
/// literals only inside an object, so braces in JSON strings are ignored
/// and stray quotes in surrounding prose are harmless. Unbalanced openers
/// yield nothing.
fn object_spans(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(idx),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, idx + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

fn into_review(obj: &Map<String, Value>, raw: &str) -> ReviewResult {
    ReviewResult {
        score: clamp_score(obj.get("score")),
        summary: obj
            .get("summary")
            .and_then(Value::as_str)
            .map_or_else(|| PLACEHOLDER_SUMMARY.to_owned(), str::to_owned),
        concerns: string_list(obj.get("concerns")),
        suggestions: string_list(obj.get("suggestions")),
        raw: raw.to_owned(),
    }
}

/// Round and clamp to `0..=100`; anything non-numeric becomes the default.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped before the cast.
fn clamp_score(value: Option<&Value>) -> u8 {
    match value.and_then(Value::as_f64) {
        Some(n) => n.round().clamp(0.0, MAX_SCORE) as u8,
        None => DEFAULT_SCORE,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
