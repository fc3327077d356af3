//! Agent stderr capture and classification.
//!
//! Stderr is drained concurrently with stdout (so the child never blocks on
//! a full pipe) but is only inspected at end of stream: several agents write
//! harmless banners there, and only what survives [`StderrFilter`] becomes an
//! `error` event.

use regex::RegexSet;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Maximum stderr bytes retained per invocation; the rest is drained and
/// dropped.
pub const MAX_STDERR_BYTES: usize = 256 * 1024;

/// Read `reader` to EOF, retaining at most [`MAX_STDERR_BYTES`].
///
/// Read errors end the capture early; whatever was read so far is kept.
pub async fn collect_stderr<R>(mut reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = [0_u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = MAX_STDERR_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(err) => {
                debug!(%err, "stderr capture: read failed, keeping partial output");
                break;
            }
        }
    }

    String::from_utf8_lossy(&kept).into_owned()
}

/// Compiled set of benign stderr line patterns.
#[derive(Debug, Clone)]
pub struct StderrFilter {
    benign: RegexSet,
}

impl StderrFilter {
    /// Compile `patterns`; invalid patterns are skipped with a warning.
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        let valid: Vec<&String> = patterns
            .iter()
            .filter(|p| {
                let ok = regex::Regex::new(p).is_ok();
                if !ok {
                    warn!(pattern = %p, "invalid benign stderr pattern, skipping");
                }
                ok
            })
            .collect();

        let benign = RegexSet::new(valid).unwrap_or_else(|_| RegexSet::empty());
        Self { benign }
    }

    /// Filter that treats every non-blank line as meaningful.
    #[must_use]
    pub fn none() -> Self {
        Self {
            benign: RegexSet::empty(),
        }
    }

    /// Return the stderr lines worth reporting, or `None` when everything is
    /// blank or benign.
    #[must_use]
    pub fn meaningful(&self, stderr: &str) -> Option<String> {
        let lines: Vec<&str> = stderr
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty() && !self.benign.is_match(line))
            .collect();

        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}
