/**
 * Failures reported by the backend client
 */
use super::key::ResourceKey;
use thiserror::Error;

/// A failed backend call. Always recoverable from the cache's point of view:
/// the owning pipeline keeps its last good value and retries on the next trigger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("backend returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("resource {0} not found")]
    NotFound(ResourceKey),
}

impl FetchError {
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}
