//! One-line summaries for tool invocations.
//!
//! [`summarize_tool`] maps a tool name and its input object to a short
//! string for progress displays. Known tools get a targeted rule; anything
//! else falls back to the first short string parameter. The function is
//! total: it never panics and never exceeds [`MAX_SUMMARY_CHARS`].

use serde_json::Value;

/// Name of the tool agents use to ask the user structured questions.
pub const ASK_USER_QUESTION_TOOL: &str = "AskUserQuestion";

/// Upper bound on any summary, in characters.
pub const MAX_SUMMARY_CHARS: usize = 60;

const PATTERN_CHARS: usize = 30;
const COMMAND_CHARS: usize = 50;
const FALLBACK_CHARS: usize = 40;
const URL_CHARS: usize = 40;

/// Summarize a tool invocation.
///
/// | Tool(s)                                  | Summary                        |
/// |------------------------------------------|--------------------------------|
/// | `Read`, `Write`, `Edit`, `MultiEdit`, `LS`, `NotebookEdit` | last two path segments |
/// | `Glob`                                   | pattern, ≤ 30 chars            |
/// | `Grep`, `WebSearch`                      | quoted pattern/query, ≤ 30     |
/// | `Bash`                                   | command, ≤ 50 chars            |
/// | `WebFetch`                               | hostname, else raw URL ≤ 40    |
/// | `Task`                                   | description, ≤ 40 chars        |
/// | `TodoWrite`, `AskUserQuestion`           | item count                     |
/// | *(other)*                                | first string param in `(0,60)` chars, ≤ 40 |
#[must_use]
pub fn summarize_tool(name: &str, params: &Value) -> String {
    let specific = match name {
        "Read" | "Write" | "Edit" | "MultiEdit" => str_field(params, "file_path").map(short_path),
        "NotebookEdit" => str_field(params, "notebook_path").map(short_path),
        "LS" => str_field(params, "path").map(short_path),
        "Glob" => str_field(params, "pattern").map(|p| truncate(p, PATTERN_CHARS)),
        "Grep" => str_field(params, "pattern").map(quoted),
        "WebSearch" => str_field(params, "query").map(quoted),
        "Bash" => str_field(params, "command").map(|c| truncate(c, COMMAND_CHARS)),
        "WebFetch" => str_field(params, "url").map(host_or_url),
        "Task" => str_field(params, "description").map(|d| truncate(d, FALLBACK_CHARS)),
        "TodoWrite" => array_len(params, "todos").map(|n| count(n, "todo")),
        ASK_USER_QUESTION_TOOL => array_len(params, "questions").map(|n| count(n, "question")),
        _ => None,
    };

    specific.unwrap_or_else(|| generic_summary(params))
}

/// Truncate `s` to at most `max` characters, ending in `…` when shortened.
#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn str_field<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn array_len(params: &Value, key: &str) -> Option<usize> {
    params.get(key).and_then(Value::as_array).map(Vec::len)
}

fn short_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();
    let tail = &segments[segments.len().saturating_sub(2)..];
    truncate(&tail.join("/"), MAX_SUMMARY_CHARS)
}

fn quoted(pattern: &str) -> String {
    format!("\"{}\"", truncate(pattern, PATTERN_CHARS))
}

fn host_or_url(raw: &str) -> String {
    url::Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .map_or_else(
            || truncate(raw, URL_CHARS),
            |host| truncate(&host, MAX_SUMMARY_CHARS),
        )
}

fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// First string parameter, in insertion order, of length `(0, 60)`.
fn generic_summary(params: &Value) -> String {
    params
        .as_object()
        .and_then(|map| {
            map.values().filter_map(Value::as_str).find(|s| {
                let len = s.chars().count();
                len > 0 && len < MAX_SUMMARY_CHARS
            })
        })
        .map(|s| truncate(s, FALLBACK_CHARS))
        .unwrap_or_default()
}
