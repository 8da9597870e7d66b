//! Error types for the sync engine.

use hubsync_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Errors are `Clone` so that a single connection attempt can hand the same
/// outcome to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server did not assign a session id in time.
    #[error("no session id received within {0:?}")]
    HandshakeTimeout(Duration),

    /// The session-id handler was removed before the server answered.
    #[error("handshake aborted before a session id was received")]
    HandshakeAborted,

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The snapshot endpoint answered with a non-success status.
    #[error("http {status}: {reason}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Reason phrase sent by the server.
        reason: String,
    },

    /// A response body could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The client has been shut down.
    #[error("client has been shut down")]
    Shutdown,
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = SyncError::transport("connection lost");
        assert_eq!(err, SyncError::Transport("connection lost".into()));
        assert_eq!(err.to_string(), "transport error: connection lost");
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to server");

        let err = SyncError::Http {
            status: 403,
            reason: "Forbidden".into(),
        };
        assert_eq!(err.to_string(), "http 403: Forbidden");
    }

    #[test]
    fn protocol_error_conversion() {
        let err: SyncError = ProtocolError::UnknownState("Detached".into()).into();
        assert!(matches!(err, SyncError::Protocol(ref m) if m.contains("Detached")));
    }
}
