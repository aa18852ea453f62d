//! Collaborator error type.

use thiserror::Error;

/// Errors returned by a collaborator (dispatcher or scheduler).
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable`: the call is repeated according to the host retry policy.
/// - `Fatal`: the execution is failed immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// Transient failure; the engine may try again.
    #[error("retryable collaborator error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal collaborator error: {0}")]
    Fatal(String),
}

impl EffectError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// The message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Fatal(msg) => msg,
        }
    }
}
