//! In-memory record store
//!
//! Same semantics as the SQLite backend, seeding included, kept in process memory.
//! Each user record owns its friend set directly.

use super::{PersistenceGateway, StoreError, StoreResult};
use crate::core::models::{ChatPayload, StoredMessage, UserFields, UserRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserRecord>>,
    messages: RwLock<Vec<StoredMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a symmetric friendship, creating bare user records as needed.
    pub async fn add_friendship(&self, a: &str, b: &str) {
        let mut users = self.users.write().await;
        for (user, friend) in [(a, b), (b, a)] {
            users
                .entry(user.to_string())
                .or_insert_with(|| blank_record(user))
                .friends
                .insert(friend.to_string());
        }
    }

    /// All persisted messages in append order.
    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.messages.read().await.clone()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

fn blank_record(uid: &str) -> UserRecord {
    UserRecord {
        uid: uid.to_string(),
        name: None,
        photo_url: None,
        online: false,
        friends: BTreeSet::new(),
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn get_user(&self, uid: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(uid).cloned())
    }

    async fn upsert_user(&self, uid: &str, fields: &UserFields) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .entry(uid.to_string())
            .or_insert_with(|| blank_record(uid));

        if let Some(name) = &fields.name {
            record.name = Some(name.clone());
        }
        if let Some(photo_url) = &fields.photo_url {
            record.photo_url = Some(photo_url.clone());
        }
        if let Some(online) = fields.online {
            record.online = online;
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_online(&self, uid: &str, online: bool) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(uid)
            .ok_or_else(|| StoreError::UserNotFound(uid.to_string()))?;
        record.online = online;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn append_message(&self, message: &ChatPayload) -> StoreResult<StoredMessage> {
        let stored = StoredMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            text: message.text.clone(),
            timestamp: Utc::now(),
        };
        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }
}
