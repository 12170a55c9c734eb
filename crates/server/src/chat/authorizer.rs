//! Friendship gate for relayed messages

use crate::core::store::PersistenceGateway;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotFriends,
    UnknownSender,
    /// The sender's record could not be read; the gate fails closed.
    StoreUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied(DenyReason),
}

impl Authorization {
    pub fn is_authorized(self) -> bool {
        matches!(self, Authorization::Authorized)
    }
}

/// Checks the sender's friendship set for the receiver.
///
/// Denials are only logged. The sender's connection is never told, so a client
/// cannot tell "denied" apart from "receiver offline".
pub struct MessageAuthorizer {
    store: Arc<dyn PersistenceGateway>,
}

impl MessageAuthorizer {
    pub fn new(store: Arc<dyn PersistenceGateway>) -> Self {
        Self { store }
    }

    pub async fn authorize(&self, sender_id: &str, receiver_id: &str) -> Authorization {
        let verdict = match self.store.get_user(sender_id).await {
            Ok(Some(record)) if record.is_friend(receiver_id) => Authorization::Authorized,
            Ok(Some(_)) => Authorization::Denied(DenyReason::NotFriends),
            Ok(None) => Authorization::Denied(DenyReason::UnknownSender),
            Err(e) => {
                error!(sender = %sender_id, "Failed to read sender record: {}", e);
                Authorization::Denied(DenyReason::StoreUnavailable)
            }
        };

        if let Authorization::Denied(reason) = verdict {
            info!(
                sender = %sender_id,
                receiver = %receiver_id,
                ?reason,
                "Message blocked"
            );
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::UserFields;
    use crate::core::store::MemoryStore;

    #[tokio::test]
    async fn test_friends_are_authorized() {
        let store = Arc::new(MemoryStore::new());
        store.add_friendship("a", "b").await;
        let authorizer = MessageAuthorizer::new(store);

        assert!(authorizer.authorize("a", "b").await.is_authorized());
        assert!(authorizer.authorize("b", "a").await.is_authorized());
    }

    #[tokio::test]
    async fn test_strangers_and_unknown_senders_are_denied() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_user("a", &UserFields::default())
            .await
            .unwrap();
        let authorizer = MessageAuthorizer::new(store);

        assert_eq!(
            authorizer.authorize("a", "b").await,
            Authorization::Denied(DenyReason::NotFriends)
        );
        assert_eq!(
            authorizer.authorize("ghost", "a").await,
            Authorization::Denied(DenyReason::UnknownSender)
        );
    }
}
