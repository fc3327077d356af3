//! Structured review recovery from free-form agent output.
//!
//! - `extractor`: layered JSON payload extraction with field clamping.

pub mod extractor;

pub use extractor::{extract_review, Extractor};
