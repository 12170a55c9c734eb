//! Presence synchronizer
//!
//! Keeps the store's `online` flag in step with registry membership and fans the
//! online snapshot out to every live connection after each registry change.
//!
//! Every broadcast is a full snapshot sent to every connection, so one presence
//! event costs O(connections). Fine for small populations; a scaling limit beyond.
//! Snapshots are taken and queued one broadcast at a time, so each connection
//! sees them in registry order and its latest one matches the registry.

use crate::chat::locks::UidLocks;
use crate::chat::protocol::ServerEvent;
use crate::chat::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, Delivery, Session};
use crate::core::models::{Identity, UserFields};
use crate::core::store::{PersistenceGateway, StoreResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of announcing an identity on a connection.
#[derive(Debug)]
pub struct ConnectOutcome {
    /// Whether the store write marking the uid online succeeded.
    pub persisted: bool,
    /// Previous session for the same uid that this connect superseded.
    pub replaced: Option<Session>,
}

pub struct PresenceSynchronizer {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn PersistenceGateway>,
    locks: UidLocks,
    /// Held from snapshot to last enqueue.
    fanout: Mutex<()>,
}

impl PresenceSynchronizer {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            registry,
            store,
            locks: UidLocks::new(),
            fanout: Mutex::new(()),
        }
    }

    /// Mark `identity` online in the store, bind it to `handle`, then broadcast.
    ///
    /// A store failure is logged and does not stop registration: the live
    /// connection is the source of truth for its own presence.
    pub async fn connect(&self, identity: Identity, handle: ConnectionHandle) -> ConnectOutcome {
        let uid = identity.uid.clone();
        let conn = handle.id();

        let (persisted, registration) = {
            let _guard = self.locks.lock(&uid).await;

            let persisted = match self.mark_online(&identity).await {
                Ok(()) => true,
                Err(e) => {
                    error!(%uid, %conn, "Failed to mark user online: {}", e);
                    false
                }
            };
            (persisted, self.registry.register(identity, handle))
        };

        if let Some(previous) = &registration.replaced {
            warn!(
                %uid,
                %conn,
                orphaned = %previous.handle.id(),
                "Duplicate connect, previous connection no longer receives relays"
            );
        }
        if let Some(released) = registration.released {
            info!(uid = %released.uid(), %conn, "Connection switched identity");
            let _guard = self.locks.lock(released.uid()).await;
            if !self.registry.contains(released.uid()) {
                self.mark_offline(released.uid()).await;
            }
        }

        info!(%uid, %conn, online = self.registry.len(), "User connected");
        self.broadcast();

        ConnectOutcome {
            persisted,
            replaced: registration.replaced,
        }
    }

    /// Drop the session owned by `conn`, mark its uid offline, then broadcast.
    ///
    /// Returns `None` when the connection never announced or was superseded by
    /// a newer connection for the same uid; nothing changes in that case.
    pub async fn disconnect(&self, conn: ConnectionId) -> Option<Session> {
        let uid = self.registry.owner_of(conn)?;

        let session = {
            let _guard = self.locks.lock(&uid).await;
            // Ownership may have moved while waiting for the lock
            let session = self.registry.unregister_by_handle(conn)?;
            self.mark_offline(session.uid()).await;
            session
        };

        info!(uid = %session.uid(), %conn, online = self.registry.len(), "User disconnected");
        self.broadcast();
        Some(session)
    }

    /// Send the current online snapshot to every registered connection.
    /// Returns how many connections had it queued.
    pub fn broadcast(&self) -> usize {
        let _fanout = self.fanout.lock();
        let sessions = self.registry.snapshot();
        let users: Vec<Identity> = sessions.iter().map(|s| s.identity.clone()).collect();

        let mut queued = 0;
        for session in &sessions {
            match session
                .handle
                .deliver(ServerEvent::UpdateUsers(users.clone()))
            {
                Delivery::Queued => queued += 1,
                Delivery::Dropped => warn!(
                    uid = %session.uid(),
                    conn = %session.handle.id(),
                    "Outbound queue full, presence update dropped"
                ),
                Delivery::Closed => debug!(
                    uid = %session.uid(),
                    conn = %session.handle.id(),
                    "Connection closing, presence update skipped"
                ),
            }
        }
        queued
    }

    async fn mark_online(&self, identity: &Identity) -> StoreResult<()> {
        match self.store.get_user(&identity.uid).await? {
            Some(_) => self.store.set_online(&identity.uid, true).await,
            None => {
                debug!(uid = %identity.uid, "Creating presence record");
                self.store
                    .upsert_user(&identity.uid, &UserFields::announced(&identity.profile))
                    .await
            }
        }
    }

    async fn mark_offline(&self, uid: &str) {
        if let Err(e) = self.store.set_online(uid, false).await {
            error!(%uid, "Failed to mark user offline: {}", e);
        }
    }
}
