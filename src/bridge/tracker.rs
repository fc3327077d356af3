//! Per-invocation session id capture.
//!
//! The first non-blank session id seen on the stream wins; later sightings,
//! whether identical or different, are ignored. Persisting the id and passing
//! it back as [`InvocationRequest::resume_session_id`] is the caller's job.
//!
//! [`InvocationRequest::resume_session_id`]: crate::models::request::InvocationRequest::resume_session_id

use tracing::debug;

/// First-write-wins holder for the agent's session id.
#[derive(Debug, Default, Clone)]
pub struct SessionTracker {
    session_id: Option<String>,
}

impl SessionTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a session id seen on the stream.
    ///
    /// Returns the id only when this call captured it, so the caller can
    /// surface it exactly once.
    pub fn observe(&mut self, candidate: Option<&str>) -> Option<&str> {
        let candidate = candidate.map(str::trim).filter(|id| !id.is_empty())?;

        if let Some(existing) = &self.session_id {
            if existing != candidate {
                debug!(
                    session_id = existing.as_str(),
                    ignored = candidate,
                    "session tracker: ignoring later session id"
                );
            }
            return None;
        }

        self.session_id = Some(candidate.to_owned());
        self.session_id.as_deref()
    }

    /// The captured session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}
