//! Structured review payload recovered from free-form agent output.

use serde::{Deserialize, Serialize};

/// Summary used when the recovered payload has no usable `summary` field.
pub const PLACEHOLDER_SUMMARY: &str = "No summary provided";

/// Score used when the recovered payload has no numeric `score` field.
pub const DEFAULT_SCORE: u8 = 50;

/// Review payload extracted by [`crate::review::extractor`].
///
/// Always constructed fresh per extraction; `raw` keeps the complete input
/// text regardless of which strategy matched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    /// Score in `0..=100`.
    pub score: u8,
    /// One-paragraph summary.
    pub summary: String,
    /// Problems the reviewer raised.
    pub concerns: Vec<String>,
    /// Improvements the reviewer proposed.
    pub suggestions: Vec<String>,
    /// Original text the payload was extracted from.
    pub raw: String,
}
