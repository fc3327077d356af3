//! Agent process bridge.
//!
//! Spawns command-line agents, speaks their line-delimited JSON protocol,
//! and turns both supported wire formats into one stream of
//! [`CanonicalEvent`](crate::models::event::CanonicalEvent)s.
//!
//! - `codec`: newline framing over the child's stdout.
//! - `normalizer`: wire-format detection and event mapping.
//! - `tool_summary`: short human-readable labels for tool calls.
//! - `tracker`: first-seen session id capture.
//! - `spawner`: process launch and graceful termination.
//! - `writer`: prompt and answer envelopes on stdin.
//! - `stderr`: diagnostic capture and benign-line filtering.
//! - `stream`: caller-facing event stream and answer handle.
//! - `orchestrator`: the per-invocation state machine.

pub mod codec;
pub mod normalizer;
pub mod orchestrator;
pub mod spawner;
pub mod stderr;
pub mod stream;
pub mod tool_summary;
pub mod tracker;
pub mod writer;

pub use orchestrator::Bridge;
pub use stream::{AnswerHandle, EventStream, Invocation};
