//! Presence and relay engine
//!
//! Ties the registry, presence synchronizer, authorizer and relay together and
//! dispatches the events of one connection. Callers must feed each connection's
//! events in arrival order and finish with [`RelayEngine::disconnected`];
//! different connections may call in concurrently.

use crate::chat::authorizer::{Authorization, MessageAuthorizer};
use crate::chat::presence::{ConnectOutcome, PresenceSynchronizer};
use crate::chat::protocol::{self, ClientEvent, PayloadError, ServerEvent};
use crate::chat::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, Session};
use crate::chat::relay::{MessageRelay, RelayOutcome};
use crate::core::models::{ChatPayload, Identity};
use crate::core::store::PersistenceGateway;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_message_len: usize,
    pub enforce_sender: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_message_len: 4096,
            enforce_sender: false,
        }
    }
}

#[derive(Debug)]
pub enum SendOutcome {
    /// Dropped silently: not persisted, not delivered.
    Denied,
    Relayed(RelayOutcome),
}

pub struct RelayEngine {
    registry: Arc<ConnectionRegistry>,
    presence: PresenceSynchronizer,
    authorizer: MessageAuthorizer,
    relay: MessageRelay,
    settings: EngineSettings,
}

impl RelayEngine {
    pub fn new(store: Arc<dyn PersistenceGateway>, settings: EngineSettings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            presence: PresenceSynchronizer::new(registry.clone(), store.clone()),
            authorizer: MessageAuthorizer::new(store.clone()),
            relay: MessageRelay::new(registry.clone(), store),
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Handle one raw text frame from `handle`'s connection.
    ///
    /// Rejected frames are answered with an `error` event on the same
    /// connection; authorization denials and offline receivers are not.
    pub async fn handle_frame(&self, handle: &ConnectionHandle, frame: &str) {
        let result = match protocol::parse_client_event(frame, self.settings.max_message_len) {
            Ok(event) => self.dispatch(handle, event).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(conn = %handle.id(), "Rejected frame: {}", e);
            handle.deliver(ServerEvent::Error {
                message: e.to_string(),
            });
        }
    }

    pub async fn dispatch(
        &self,
        handle: &ConnectionHandle,
        event: ClientEvent,
    ) -> Result<(), PayloadError> {
        match event {
            ClientEvent::UserConnected(identity) => {
                self.user_connected(handle, identity).await;
            }
            ClientEvent::SendMessage(message) => {
                self.send_message(handle, message).await?;
            }
        }
        Ok(())
    }

    pub async fn user_connected(
        &self,
        handle: &ConnectionHandle,
        identity: Identity,
    ) -> ConnectOutcome {
        self.presence.connect(identity, handle.clone()).await
    }

    /// Authorize, then persist and forward.
    ///
    /// Only fails when sender enforcement is on and `senderId` is not the
    /// identity announced on this connection.
    pub async fn send_message(
        &self,
        handle: &ConnectionHandle,
        message: ChatPayload,
    ) -> Result<SendOutcome, PayloadError> {
        if self.settings.enforce_sender
            && self.registry.owner_of(handle.id()).as_deref() != Some(message.sender_id.as_str())
        {
            return Err(PayloadError::SenderMismatch {
                claimed: message.sender_id,
            });
        }

        match self
            .authorizer
            .authorize(&message.sender_id, &message.receiver_id)
            .await
        {
            Authorization::Authorized => {
                let outcome = self.relay.relay(message).await;
                debug!(
                    conn = %handle.id(),
                    persisted = outcome.stored.is_some(),
                    delivered = outcome.delivered,
                    "Message relayed"
                );
                Ok(SendOutcome::Relayed(outcome))
            }
            Authorization::Denied(_) => Ok(SendOutcome::Denied),
        }
    }

    /// Transport-level connection loss. Terminal for the connection's session.
    pub async fn disconnected(&self, conn: ConnectionId) -> Option<Session> {
        let session = self.presence.disconnect(conn).await;
        if session.is_none() {
            debug!(%conn, "Connection closed without a live session");
        }
        session
    }

    /// Re-send the presence snapshot to everyone.
    pub fn broadcast_presence(&self) -> usize {
        self.presence.broadcast()
    }
}
