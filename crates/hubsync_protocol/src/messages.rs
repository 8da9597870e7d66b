//! Hub message names and inbound message decoding.

use crate::change::ChangeEnvelope;
use crate::error::{ProtocolError, ProtocolResult};
use serde_json::Value;

/// Inbound message carrying a change envelope.
pub const CHANGES_MESSAGE: &str = "DataChanged";

/// Inbound message carrying the session id assigned by the server.
pub const SESSION_ID_MESSAGE: &str = "SessionId";

/// Remote action that stops server-side delivery for a feed.
pub const UNSUBSCRIBE_ACTION: &str = "Unsubscribe";

/// HTTP header that tags snapshot requests with the session id.
pub const SESSION_HEADER: &str = "X-Hub-Session-Id";

/// A decoded inbound hub message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// A batch of changes.
    Changes(ChangeEnvelope),
    /// The session id assigned by the server.
    SessionAssigned(String),
}

impl HubMessage {
    /// Decodes a named message from its arguments.
    pub fn decode(name: &str, args: &[Value]) -> ProtocolResult<Self> {
        match name {
            CHANGES_MESSAGE => {
                let payload = first_argument(name, args)?;
                Ok(HubMessage::Changes(ChangeEnvelope::from_value(payload.clone())?))
            }
            SESSION_ID_MESSAGE => Ok(HubMessage::SessionAssigned(session_id_from_args(args)?)),
            other => Err(ProtocolError::UnknownMessage(other.to_string())),
        }
    }
}

/// The session id must be a non-empty string.
fn session_id_from_args(args: &[Value]) -> ProtocolResult<String> {
    let value = first_argument(SESSION_ID_MESSAGE, args)?;
    match value.as_str() {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ProtocolError::InvalidArgument {
            message: SESSION_ID_MESSAGE.to_string(),
            reason: format!("expected a non-empty string, got {value}"),
        }),
    }
}

fn first_argument<'a>(message: &str, args: &'a [Value]) -> ProtocolResult<&'a Value> {
    args.first().ok_or_else(|| ProtocolError::MissingArgument {
        message: message.to_string(),
        index: 0,
    })
}
