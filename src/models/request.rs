//! Invocation parameters accepted by [`Bridge::start`](crate::bridge::Bridge::start).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{AppError, Result};

/// Parameters for a single agent invocation.
///
/// A resumed invocation is an ordinary request with
/// [`resume_session_id`](Self::resume_session_id) set; the bridge does
/// not distinguish it otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    /// Prompt text (or the user's answer when resuming).
    pub prompt: String,
    /// Directory the agent process starts in.
    pub working_directory: PathBuf,
    /// Session to resume, as surfaced by a prior invocation.
    pub resume_session_id: Option<String>,
    /// Send the prompt as a JSON envelope and keep stdin open.
    pub structured_input: bool,
    /// Files the agent is told to read before responding.
    pub extra_context_paths: Vec<PathBuf>,
    /// Hard limit on the invocation's wall-clock time.
    pub max_duration: Option<Duration>,
}

impl InvocationRequest {
    /// Create a plain one-shot request.
    #[must_use]
    pub fn new(prompt: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            working_directory: working_directory.into(),
            resume_session_id: None,
            structured_input: false,
            extra_context_paths: Vec::new(),
            max_duration: None,
        }
    }

    /// Create a request that answers a pending question out-of-band by
    /// resuming `session_id` with `answer` as the new prompt.
    #[must_use]
    pub fn answering(
        session_id: impl Into<String>,
        answer: impl Into<String>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self::new(answer, working_directory).resume(session_id)
    }

    /// Resume a prior conversation.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(session_id.into());
        self
    }

    /// Select structured (JSON envelope) stdin mode.
    #[must_use]
    pub fn structured(mut self, structured: bool) -> Self {
        self.structured_input = structured;
        self
    }

    /// Add files the agent must read before responding.
    #[must_use]
    pub fn context_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.extra_context_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    /// Bound the invocation's duration.
    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    /// Reject requests that cannot produce a meaningful invocation.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRequest`] when the prompt is blank, the
    /// resume id is blank, the working directory is not a directory, or the
    /// maximum duration is zero.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest("prompt must not be empty".into()));
        }

        if self
            .resume_session_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(AppError::InvalidRequest(
                "resume session id must not be empty".into(),
            ));
        }

        if !self.working_directory.is_dir() {
            return Err(AppError::InvalidRequest(format!(
                "working directory {} does not exist",
                self.working_directory.display()
            )));
        }

        if self.max_duration.is_some_and(|d| d.is_zero()) {
            return Err(AppError::InvalidRequest(
                "max duration must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Prompt actually delivered to the agent.
    ///
    /// When context paths are present they are prepended as explicit
    /// read-first instructions; otherwise the prompt is returned unchanged.
    #[must_use]
    pub fn effective_prompt(&self) -> String {
        if self.extra_context_paths.is_empty() {
            return self.prompt.clone();
        }

        let mut out = String::from(
            "Before responding, read the following files for context:\n",
        );
        for path in &self.extra_context_paths {
            let _ = writeln!(out, "- {}", display_path(path));
        }
        out.push('\n');
        out.push_str(&self.prompt);
        out
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
