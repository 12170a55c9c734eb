use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Profile fields an identity announces about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(
        rename = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// An externally issued identity, as carried by `user_connected`
/// and by every entry of an `update_users` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(flatten)]
    pub profile: Profile,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            profile: Profile::default(),
        }
    }

    pub fn with_profile(
        uid: impl Into<String>,
        display_name: impl Into<String>,
        photo_url: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            profile: Profile {
                display_name: Some(display_name.into()),
                photo_url: Some(photo_url.into()),
            },
        }
    }
}

/// Durable presence record for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    pub name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub online: bool,
    /// Friendship set, read-only to the relay.
    pub friends: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_friend(&self, uid: &str) -> bool {
        self.friends.contains(uid)
    }
}

/// Fields written by a merging upsert. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFields {
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub online: Option<bool>,
}

impl UserFields {
    /// Fields for a freshly announced identity.
    pub fn announced(profile: &Profile) -> Self {
        Self {
            name: profile.display_name.clone(),
            photo_url: profile.photo_url.clone(),
            online: Some(true),
        }
    }
}

/// A chat message as sent over the wire by `send_message`
/// and forwarded by `receive_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
}

impl ChatPayload {
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            text: text.into(),
        }
    }
}

/// A message after the store accepted it. The timestamp is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
