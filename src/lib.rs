#![forbid(unsafe_code)]

//! `agent-bridge`: run command-line AI agents as child processes and consume
//! their output as one canonical event stream.
//!
//! ```rust,ignore
//! let bridge = Bridge::new(BridgeConfig::default());
//! let request = InvocationRequest::new("Review this diff", "/repo");
//! let invocation = bridge.start(request, &CancellationToken::new())?;
//! let transcript = Transcript::collect(invocation.events).await;
//! let review = extract_review(transcript.final_text());
//! ```

pub mod bridge;
pub mod config;
pub mod errors;
pub mod models;
pub mod review;
pub mod transcript;

pub use bridge::{AnswerHandle, Bridge, EventStream, Invocation};
pub use config::{AgentProfile, BridgeConfig};
pub use errors::{AppError, Result};
pub use models::event::{CanonicalEvent, ErrorType};
pub use models::request::InvocationRequest;
pub use models::review::ReviewResult;
pub use review::{extract_review, Extractor};
pub use transcript::Transcript;
