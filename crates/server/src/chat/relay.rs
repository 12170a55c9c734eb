//! Message relay
//!
//! Persist first, then forward to the receiver's live connection if it has one.
//! There is no retry, no queue and no acknowledgement: a receiver who connects
//! later does not get earlier messages replayed and must read history from the
//! store. Live delivery says nothing about completeness.

use crate::chat::protocol::ServerEvent;
use crate::chat::registry::{ConnectionRegistry, Delivery};
use crate::core::models::{ChatPayload, StoredMessage};
use crate::core::store::PersistenceGateway;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug)]
pub struct RelayOutcome {
    /// The durable copy, if the store accepted it.
    pub stored: Option<StoredMessage>,
    /// Whether the message was queued on the receiver's connection.
    pub delivered: bool,
}

pub struct MessageRelay {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn PersistenceGateway>,
}

impl MessageRelay {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn PersistenceGateway>) -> Self {
        Self { registry, store }
    }

    /// Relay an already authorized message.
    pub async fn relay(&self, message: ChatPayload) -> RelayOutcome {
        let stored = match self.store.append_message(&message).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                error!(
                    sender = %message.sender_id,
                    receiver = %message.receiver_id,
                    "Failed to persist message: {}",
                    e
                );
                None
            }
        };

        // Looked up after the store call so a connect or disconnect that landed
        // meanwhile is honored.
        let Some(handle) = self.registry.lookup(&message.receiver_id) else {
            debug!(receiver = %message.receiver_id, "Receiver offline, message not delivered");
            return RelayOutcome {
                stored,
                delivered: false,
            };
        };

        let receiver = message.receiver_id.clone();
        let delivered = match handle.deliver(ServerEvent::ReceiveMessage(message)) {
            Delivery::Queued => true,
            Delivery::Dropped => {
                warn!(%receiver, conn = %handle.id(), "Outbound queue full, message dropped");
                false
            }
            Delivery::Closed => {
                debug!(%receiver, conn = %handle.id(), "Receiver connection closing");
                false
            }
        };

        RelayOutcome { stored, delivered }
    }
}
