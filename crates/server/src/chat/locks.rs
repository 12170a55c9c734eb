//! Per-uid serialization for presence transitions

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async locks keyed by uid. Entries are dropped once nobody holds or awaits them.
#[derive(Default)]
pub struct UidLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub struct UidGuard<'a> {
    owner: &'a UidLocks,
    uid: String,
    _guard: OwnedMutexGuard<()>,
}

impl UidLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds `uid`, then hold it until the guard drops.
    pub async fn lock(&self, uid: &str) -> UidGuard<'_> {
        let lock = self
            .locks
            .lock()
            .entry(uid.to_string())
            .or_default()
            .clone();

        UidGuard {
            owner: self,
            uid: uid.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of uids with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for UidGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock();
        // The map and this guard's own reference; anyone else is still waiting.
        if locks
            .get(&self.uid)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.uid);
        }
    }
}
