//! Durable store gateway
//!
//! The relay only ever talks to the record store through [`PersistenceGateway`].
//! Two backends ship with the server: SQLite for deployments and an in-memory
//! store for tests and throwaway runs.

pub mod memory_store;
pub mod sqlite_store;

use crate::core::config::{RelayConfig, StoreBackend};
use crate::core::models::{ChatPayload, StoredMessage, UserFields, UserRecord};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("user `{0}` not found")]
    UserNotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Record store surface used by the presence and relay engine.
///
/// Users are keyed by `uid`. Messages get a store-generated id and timestamp.
/// Nothing here deletes: users are upserted or updated, messages appended.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn get_user(&self, uid: &str) -> StoreResult<Option<UserRecord>>;

    /// Create the user if absent, otherwise merge the given fields into it.
    /// A created record starts with an empty friend set.
    async fn upsert_user(&self, uid: &str, fields: &UserFields) -> StoreResult<()>;

    /// Fails with [`StoreError::UserNotFound`] when no record exists.
    async fn set_online(&self, uid: &str, online: bool) -> StoreResult<()>;

    async fn append_message(&self, message: &ChatPayload) -> StoreResult<StoredMessage>;
}

/// Bounds every call on the wrapped gateway.
pub struct TimedStore {
    inner: Arc<dyn PersistenceGateway>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn PersistenceGateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Wrap `inner` when a timeout is configured, otherwise hand it back as is.
    pub fn wrap(
        inner: Arc<dyn PersistenceGateway>,
        timeout: Option<Duration>,
    ) -> Arc<dyn PersistenceGateway> {
        match timeout {
            Some(timeout) => Arc::new(Self::new(inner, timeout)),
            None => inner,
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>> + Send) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl PersistenceGateway for TimedStore {
    async fn get_user(&self, uid: &str) -> StoreResult<Option<UserRecord>> {
        self.bounded(self.inner.get_user(uid)).await
    }

    async fn upsert_user(&self, uid: &str, fields: &UserFields) -> StoreResult<()> {
        self.bounded(self.inner.upsert_user(uid, fields)).await
    }

    async fn set_online(&self, uid: &str, online: bool) -> StoreResult<()> {
        self.bounded(self.inner.set_online(uid, online)).await
    }

    async fn append_message(&self, message: &ChatPayload) -> StoreResult<StoredMessage> {
        self.bounded(self.inner.append_message(message)).await
    }
}

/// Open the configured backend, bounded by the configured store timeout.
pub async fn open_store(config: &RelayConfig) -> anyhow::Result<Arc<dyn PersistenceGateway>> {
    let store: Arc<dyn PersistenceGateway> = match &config.store {
        StoreBackend::Memory => {
            info!("Using in-memory store (records are lost on restart)");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Sqlite(url) => {
            info!("Using SQLite store at {}", url);
            Arc::new(SqliteStore::open(url).await?)
        }
    };
    Ok(TimedStore::wrap(store, config.store_timeout))
}
