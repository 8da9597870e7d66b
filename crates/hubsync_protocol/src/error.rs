//! Error types for protocol decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding hub messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload is not a valid change envelope.
    #[error("invalid change envelope: {0}")]
    InvalidEnvelope(String),

    /// A change carried a state name or code that is not recognized.
    #[error("unknown change state: {0}")]
    UnknownState(String),

    /// A hub message with a name this client does not handle.
    #[error("unknown hub message: {0}")]
    UnknownMessage(String),

    /// A hub message did not carry a required argument.
    #[error("message '{message}' is missing argument {index}")]
    MissingArgument {
        /// Hub message name.
        message: String,
        /// Position of the missing argument.
        index: usize,
    },

    /// A hub message argument had the wrong shape.
    #[error("message '{message}' has an invalid argument: {reason}")]
    InvalidArgument {
        /// Hub message name.
        message: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEnvelope(err.to_string())
    }
}
