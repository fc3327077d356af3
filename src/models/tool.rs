//! Client-side view of tool invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::CanonicalEvent;

/// Lifecycle of a tool invocation as observed from the event stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// No later event has been observed yet.
    Running,
    /// A later event showed the agent moved on.
    Completed,
    /// The stream ended without a result while the tool was running.
    Interrupted,
}

/// Tool execution record reconstructed from [`CanonicalEvent::Tool`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    /// Tool-use correlation identifier.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Short summary.
    pub summary: String,
    /// Time the invocation was observed.
    pub start_time: DateTime<Utc>,
    /// Current status.
    pub status: ToolStatus,
}

impl ToolExecution {
    /// Start tracking a tool from its event; `None` for other event kinds.
    #[must_use]
    pub fn from_event(event: &CanonicalEvent) -> Option<Self> {
        match event {
            CanonicalEvent::Tool {
                id,
                name,
                summary,
                timestamp,
            } => Some(Self {
                id: id.clone(),
                name: name.clone(),
                summary: summary.clone(),
                start_time: *timestamp,
                status: ToolStatus::Running,
            }),
            _ => None,
        }
    }

    /// Whether the tool is still considered running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ToolStatus::Running
    }
}
