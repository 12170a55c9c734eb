//! Presence and relay on the SQLite backend

use relay_server::chat::authorizer::{Authorization, MessageAuthorizer};
use relay_server::chat::engine::{EngineSettings, RelayEngine, SendOutcome};
use relay_server::chat::protocol::ServerEvent;
use relay_server::chat::registry::ConnectionHandle;
use relay_server::core::models::{ChatPayload, Identity};
use relay_server::core::store::{MemoryStore, PersistenceGateway, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;

async fn setup() -> anyhow::Result<(TempDir, Arc<SqliteStore>, RelayEngine)> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(SqliteStore::open_path(&dir.path().join("relay.sqlite")).await?);
    let engine = RelayEngine::new(store.clone(), EngineSettings::default());
    Ok((dir, store, engine))
}

fn received(rx: &mut Receiver<ServerEvent>) -> Vec<ChatPayload> {
    let mut messages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ServerEvent::ReceiveMessage(payload) = event {
            messages.push(payload);
        }
    }
    messages
}

#[tokio::test]
async fn test_seeded_friends_authorize_on_both_backends() -> anyhow::Result<()> {
    let (_dir, sqlite, _engine) = setup().await?;
    let memory = Arc::new(MemoryStore::new());
    sqlite.add_friendship("alice", "bob").await?;
    memory.add_friendship("alice", "bob").await;

    let on_sqlite = MessageAuthorizer::new(sqlite).authorize("alice", "bob").await;
    let on_memory = MessageAuthorizer::new(memory).authorize("alice", "bob").await;
    assert_eq!(on_sqlite, Authorization::Authorized);
    assert_eq!(on_sqlite, on_memory);
    Ok(())
}

#[tokio::test]
async fn test_presence_round_trip() -> anyhow::Result<()> {
    let (_dir, store, engine) = setup().await?;
    let (alice, _rx) = ConnectionHandle::channel(16);

    let outcome = engine
        .user_connected(&alice, Identity::with_profile("alice", "Alice", "a.png"))
        .await;
    assert!(outcome.persisted);
    let record = store.get_user("alice").await?.unwrap();
    assert!(record.online);
    assert_eq!(record.name.as_deref(), Some("Alice"));

    engine.disconnected(alice.id()).await.unwrap();
    assert!(!store.get_user("alice").await?.unwrap().online);
    Ok(())
}

#[tokio::test]
async fn test_authorized_delivery() -> anyhow::Result<()> {
    let (_dir, store, engine) = setup().await?;
    store.add_friendship("alice", "bob").await?;
    let (alice, _alice_rx) = ConnectionHandle::channel(16);
    let (bob, mut bob_rx) = ConnectionHandle::channel(16);
    engine.user_connected(&alice, Identity::new("alice")).await;
    engine.user_connected(&bob, Identity::new("bob")).await;

    let outcome = engine
        .send_message(&alice, ChatPayload::new("alice", "bob", "hi"))
        .await?;
    assert!(matches!(outcome, SendOutcome::Relayed(ref relay) if relay.delivered));
    assert_eq!(received(&mut bob_rx), vec![ChatPayload::new("alice", "bob", "hi")]);

    let history = store.messages_between("alice", "bob").await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender_id, "alice");
    assert_eq!(history[0].text, "hi");
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_block() -> anyhow::Result<()> {
    let (_dir, store, engine) = setup().await?;
    let (alice, _alice_rx) = ConnectionHandle::channel(16);
    let (bob, mut bob_rx) = ConnectionHandle::channel(16);
    engine.user_connected(&alice, Identity::new("alice")).await;
    engine.user_connected(&bob, Identity::new("bob")).await;

    let outcome = engine
        .send_message(&alice, ChatPayload::new("alice", "bob", "hi"))
        .await?;
    assert!(matches!(outcome, SendOutcome::Denied));
    assert!(received(&mut bob_rx).is_empty());
    assert!(store.messages_between("alice", "bob").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_offline_receiver_persists_without_delivery() -> anyhow::Result<()> {
    let (_dir, store, engine) = setup().await?;
    store.add_friendship("alice", "bob").await?;
    let (alice, mut alice_rx) = ConnectionHandle::channel(16);
    engine.user_connected(&alice, Identity::new("alice")).await;

    let outcome = engine
        .send_message(&alice, ChatPayload::new("alice", "bob", "later"))
        .await?;
    match outcome {
        SendOutcome::Relayed(relay) => {
            assert!(!relay.delivered);
            assert!(relay.stored.is_some());
        }
        SendOutcome::Denied => panic!("friends must be authorized"),
    }
    assert!(received(&mut alice_rx).is_empty());
    assert_eq!(store.messages_between("alice", "bob").await?.len(), 1);
    Ok(())
}
