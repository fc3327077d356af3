//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration for failures that cannot be expressed as stream events.
///
/// Runtime failures of a running invocation (spawn errors, agent errors,
/// stderr noise) are delivered in-band as
/// [`CanonicalEvent::Error`](crate::models::event::CanonicalEvent::Error);
/// this type covers configuration, request validation, framing, and
/// in-band answer writes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Stream framing, process plumbing, or stdin write failure.
    Bridge(String),
    /// Invocation parameters were rejected before spawning.
    InvalidRequest(String),
    /// The selected agent does not support the requested capability.
    Unsupported(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Bridge(msg) => write!(f, "bridge: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
