//! Hub transport error types.

use thiserror::Error;

/// Error returned by any [`HubApi`](super::HubApi) operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub answered with a non-2xx status.
    #[error("{status} - {text}")]
    Status {
        /// Numeric HTTP status.
        status: u16,
        /// Status text (canonical reason phrase).
        text: String,
    },

    /// The request never produced a response (connect, TLS, reset...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// A typed call expected a body but the hub sent nothing.
    #[error("empty response from {0}")]
    EmptyResponse(String),
}

impl HubError {
    /// Create a Status error.
    pub fn status(status: u16, text: impl Into<String>) -> Self {
        Self::Status {
            status,
            text: text.into(),
        }
    }

    /// Returns true if the hub reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HubError::Status { status: 404, .. })
    }
}

/// Hub result type.
pub type HubResult<T> = Result<T, HubError>;
