//! Connection registry
//!
//! In-memory directory of live sessions: at most one per `uid`, at most one per
//! connection. Volatile by nature, it starts empty and is rebuilt from
//! reconnects after a restart.

use crate::chat::protocol::ServerEvent;
use crate::core::models::Identity;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Process-unique id of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What happened to an event handed to [`ConnectionHandle::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The recipient's outbound queue was full; the event was dropped for it.
    Dropped,
    /// The connection's writer is gone.
    Closed,
}

/// Sending half of a connection's bounded outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::next(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event without waiting. Never blocks the caller on a slow peer.
    pub fn deliver(&self, event: ServerEvent) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One identity bound to one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub handle: ConnectionHandle,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn uid(&self) -> &str {
        &self.identity.uid
    }
}

/// Sessions displaced by a [`ConnectionRegistry::register`] call.
#[derive(Debug, Default)]
pub struct Registration {
    /// Earlier session for the same uid on another connection (last write wins).
    pub replaced: Option<Session>,
    /// Earlier session of the same connection under a different uid.
    pub released: Option<Session>,
}

#[derive(Default)]
struct Inner {
    by_uid: HashMap<String, Session>,
    by_conn: HashMap<ConnectionId, String>,
}

/// Owned, constructor-injected registry. Locks are never held across an await.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `handle`, replacing whatever either was bound to before.
    /// The displaced connection is not notified.
    pub fn register(&self, identity: Identity, handle: ConnectionHandle) -> Registration {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let conn = handle.id();
        let uid = identity.uid.clone();

        let released = inner
            .by_conn
            .get(&conn)
            .filter(|previous| **previous != uid)
            .cloned()
            .and_then(|previous| inner.by_uid.remove(&previous));

        let session = Session {
            identity,
            handle,
            connected_at: Utc::now(),
        };
        let replaced = inner
            .by_uid
            .insert(uid.clone(), session)
            .filter(|old| old.handle.id() != conn);
        if let Some(old) = &replaced {
            inner.by_conn.remove(&old.handle.id());
        }
        inner.by_conn.insert(conn, uid);

        Registration { replaced, released }
    }

    /// Remove the session owned by `conn`, if it still owns one.
    pub fn unregister_by_handle(&self, conn: ConnectionId) -> Option<Session> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let uid = inner.by_conn.remove(&conn)?;
        inner.by_uid.remove(&uid)
    }

    /// The uid currently announced on `conn`.
    pub fn owner_of(&self, conn: ConnectionId) -> Option<String> {
        self.inner.read().by_conn.get(&conn).cloned()
    }

    pub fn lookup(&self, uid: &str) -> Option<ConnectionHandle> {
        self.inner
            .read()
            .by_uid
            .get(uid)
            .map(|session| session.handle.clone())
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.inner.read().by_uid.contains_key(uid)
    }

    /// All sessions, ordered by uid.
    pub fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.inner.read().by_uid.values().cloned().collect();
        sessions.sort_by(|a, b| a.uid().cmp(b.uid()));
        sessions
    }

    /// Normalized presence view: identities only, ordered by uid.
    pub fn online_users(&self) -> Vec<Identity> {
        self.snapshot()
            .into_iter()
            .map(|session| session.identity)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ChatPayload;

    #[test]
    fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(4);

        let registration = registry.register(Identity::new("alice"), handle.clone());
        assert!(registration.replaced.is_none());
        assert!(registration.released.is_none());

        assert!(registry.contains("alice"));
        assert_eq!(registry.lookup("alice").unwrap().id(), handle.id());
        assert_eq!(registry.owner_of(handle.id()).as_deref(), Some("alice"));
    }

    #[test]
    fn test_last_write_wins() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = ConnectionHandle::channel(4);
        let (second, _rx2) = ConnectionHandle::channel(4);

        registry.register(Identity::new("alice"), first.clone());
        let registration = registry.register(Identity::new("alice"), second.clone());

        assert_eq!(registration.replaced.unwrap().handle.id(), first.id());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("alice").unwrap().id(), second.id());

        // The orphaned connection no longer owns anything
        assert!(registry.owner_of(first.id()).is_none());
        assert!(registry.unregister_by_handle(first.id()).is_none());
        assert!(registry.contains("alice"));
    }

    #[test]
    fn test_reannounce_on_same_connection_is_not_a_replacement() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(4);

        registry.register(Identity::new("alice"), handle.clone());
        let registration = registry.register(
            Identity::with_profile("alice", "Alice", "a.png"),
            handle.clone(),
        );

        assert!(registration.replaced.is_none());
        assert_eq!(
            registry.online_users()[0].profile.display_name.as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn test_switching_uid_releases_previous_session() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(4);

        registry.register(Identity::new("alice"), handle.clone());
        let registration = registry.register(Identity::new("bob"), handle.clone());

        assert_eq!(registration.released.unwrap().uid(), "alice");
        assert!(!registry.contains("alice"));
        assert_eq!(registry.owner_of(handle.id()).as_deref(), Some("bob"));
    }

    #[test]
    fn test_unregister_and_snapshot_order() {
        let registry = ConnectionRegistry::new();
        let (c, _rc) = ConnectionHandle::channel(4);
        let (a, _ra) = ConnectionHandle::channel(4);
        let (b, _rb) = ConnectionHandle::channel(4);

        registry.register(Identity::new("carol"), c.clone());
        registry.register(Identity::new("alice"), a);
        registry.register(Identity::new("bob"), b);

        let uids: Vec<String> = registry.online_users().into_iter().map(|i| i.uid).collect();
        assert_eq!(uids, ["alice", "bob", "carol"]);

        let removed = registry.unregister_by_handle(c.id()).unwrap();
        assert_eq!(removed.uid(), "carol");
        assert_eq!(registry.len(), 2);
        assert!(registry.unregister_by_handle(c.id()).is_none());
    }

    #[test]
    fn test_delivery_outcomes() {
        let (handle, mut rx) = ConnectionHandle::channel(1);
        let event = ServerEvent::ReceiveMessage(ChatPayload::new("a", "b", "hi"));

        assert_eq!(handle.deliver(event.clone()), Delivery::Queued);
        assert_eq!(handle.deliver(event.clone()), Delivery::Dropped);
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.deliver(event), Delivery::Closed);
    }
}
