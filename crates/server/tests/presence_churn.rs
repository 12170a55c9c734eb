//! Presence convergence under parallel connect/disconnect churn

use relay_server::chat::engine::{EngineSettings, RelayEngine};
use relay_server::chat::protocol::ServerEvent;
use relay_server::chat::registry::{ConnectionHandle, ConnectionId};
use relay_server::core::models::Identity;
use relay_server::core::store::{MemoryStore, PersistenceGateway};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;

// Large enough that no broadcast is dropped for a full queue
const QUEUE: usize = 1024;

fn setup() -> (Arc<MemoryStore>, Arc<RelayEngine>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(RelayEngine::new(store.clone(), EngineSettings::default()));
    (store, engine)
}

fn last_presence(rx: &mut Receiver<ServerEvent>) -> Option<Vec<String>> {
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if let ServerEvent::UpdateUsers(users) = event {
            last = Some(users.into_iter().map(|u| u.uid).collect());
        }
    }
    last
}

/// Every live connection's latest snapshot equals the registry.
fn assert_snapshots_match_registry(
    engine: &RelayEngine,
    receivers: &mut HashMap<ConnectionId, Receiver<ServerEvent>>,
) {
    let expected: Vec<String> = engine
        .registry()
        .snapshot()
        .iter()
        .map(|session| session.uid().to_string())
        .collect();

    for session in engine.registry().snapshot() {
        let rx = receivers
            .get_mut(&session.handle.id())
            .expect("live session has a receiver");
        assert_eq!(
            last_presence(rx).as_ref(),
            Some(&expected),
            "stale presence for {}",
            session.uid()
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_connects_end_with_full_snapshot() {
    for _round in 0..10 {
        let (_store, engine) = setup();
        let mut receivers = HashMap::new();
        let mut tasks = Vec::new();

        for i in 0..64 {
            let (handle, rx) = ConnectionHandle::channel(QUEUE);
            receivers.insert(handle.id(), rx);
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .user_connected(&handle, Identity::new(format!("user-{:02}", i)))
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(engine.registry().len(), 64);
        assert_snapshots_match_registry(&engine, &mut receivers);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_churn_converges_store_registry_and_broadcasts() {
    for _round in 0..5 {
        let (store, engine) = setup();
        let mut receivers = HashMap::new();
        let mut tasks = Vec::new();

        for i in 0..32 {
            let uid = format!("user-{:02}", i);
            let (first, first_rx) = ConnectionHandle::channel(QUEUE);
            let (second, second_rx) = ConnectionHandle::channel(QUEUE);
            receivers.insert(first.id(), first_rx);
            receivers.insert(second.id(), second_rx);

            // Two connections for one uid racing each other
            let engine_a = engine.clone();
            let uid_a = uid.clone();
            tasks.push(tokio::spawn(async move {
                engine_a.user_connected(&first, Identity::new(uid_a)).await;
                tokio::task::yield_now().await;
                engine_a.disconnected(first.id()).await;
            }));

            let engine_b = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine_b.user_connected(&second, Identity::new(uid)).await;
                if i % 2 == 0 {
                    engine_b.disconnected(second.id()).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for i in 0..32 {
            let uid = format!("user-{:02}", i);
            let record = store.get_user(&uid).await.unwrap().unwrap();
            assert_eq!(
                record.online,
                engine.registry().contains(&uid),
                "online flag diverged from registry for {}",
                uid
            );
        }
        // Even uids always end fully disconnected
        for i in (0..32).step_by(2) {
            assert!(!engine.registry().contains(&format!("user-{:02}", i)));
        }
        assert_snapshots_match_registry(&engine, &mut receivers);
    }
}
