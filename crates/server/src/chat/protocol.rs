//! Real-time event envelopes
//!
//! Every WebSocket text frame carries exactly one event:
//!
//! ```text
//! {"event": "user_connected", "data": {"uid": "u1", "displayName": "Alice", "photoURL": "..."}}
//! {"event": "send_message",   "data": {"senderId": "u1", "receiverId": "u2", "text": "hi"}}
//! {"event": "update_users",   "data": [{"uid": "u1", "displayName": "Alice"}]}
//! {"event": "receive_message","data": {"senderId": "u1", "receiverId": "u2", "text": "hi"}}
//! {"event": "error",          "data": {"message": "..."}}
//! ```
//!
//! Inbound frames are checked here, before anything touches the registry or the store.

use crate::core::models::{ChatPayload, Identity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const USER_CONNECTED: &str = "user_connected";
pub const SEND_MESSAGE: &str = "send_message";

/// Client -> server events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    UserConnected(Identity),
    SendMessage(ChatPayload),
}

/// Server -> client events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full snapshot of online identities, sent to every connection
    UpdateUsers(Vec<Identity>),
    /// Relayed chat message, sent to the recipient only
    ReceiveMessage(ChatPayload),
    /// Rejection of a frame this connection sent
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("invalid `{event}` payload: {source}")]
    InvalidData {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("message text exceeds {max} bytes")]
    TextTooLong { max: usize },

    #[error("senderId `{claimed}` does not match the identity announced on this connection")]
    SenderMismatch { claimed: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn non_empty(value: &str, field: &'static str) -> Result<(), PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::EmptyField(field));
    }
    Ok(())
}

/// Parse and validate one inbound frame.
pub fn parse_client_event(frame: &str, max_text_len: usize) -> Result<ClientEvent, PayloadError> {
    let envelope: Envelope = serde_json::from_str(frame).map_err(PayloadError::Malformed)?;

    match envelope.event.as_str() {
        USER_CONNECTED => {
            let identity: Identity = serde_json::from_value(envelope.data).map_err(|source| {
                PayloadError::InvalidData {
                    event: USER_CONNECTED,
                    source,
                }
            })?;
            non_empty(&identity.uid, "uid")?;
            Ok(ClientEvent::UserConnected(identity))
        }
        SEND_MESSAGE => {
            let payload: ChatPayload =
                serde_json::from_value(envelope.data).map_err(|source| {
                    PayloadError::InvalidData {
                        event: SEND_MESSAGE,
                        source,
                    }
                })?;
            non_empty(&payload.sender_id, "senderId")?;
            non_empty(&payload.receiver_id, "receiverId")?;
            if payload.text.len() > max_text_len {
                return Err(PayloadError::TextTooLong { max: max_text_len });
            }
            Ok(ClientEvent::SendMessage(payload))
        }
        other => Err(PayloadError::UnknownEvent(other.to_string())),
    }
}
