//! SQLite record store
//!
//! Tables: `users` (presence records), `friendships` (one row per direction)
//! and `messages` (append-only history).

use super::{PersistenceGateway, StoreError, StoreResult};
use crate::core::models::{ChatPayload, StoredMessage, UserFields, UserRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

pub struct SqliteStore {
    pool: SqlitePool,
}

type UserRow = (String, Option<String>, Option<String>, bool, String);
type MessageRow = (String, String, String, String, String);

impl SqliteStore {
    /// Open (creating if missing) the database behind a `sqlite://` url.
    pub async fn open(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_db().await?;

        info!("[Store] SQLite initialized at {}", url);
        Ok(store)
    }

    /// Open a database file by path.
    pub async fn open_path(path: &Path) -> StoreResult<Self> {
        Self::open(&format!(
            "sqlite://{}",
            path.to_string_lossy().replace('\\', "/")
        ))
        .await
    }

    async fn init_db(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid TEXT PRIMARY KEY,
                name TEXT,
                photo_url TEXT,
                online INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS friendships (
                user_id TEXT NOT NULL,
                friend_id TEXT NOT NULL,
                PRIMARY KEY (user_id, friend_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages (sender_id, receiver_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a symmetric friendship, creating bare user records as needed.
    /// Friend management lives outside the relay; this exists for seeding and tests.
    pub async fn add_friendship(&self, a: &str, b: &str) -> StoreResult<()> {
        let now = format_timestamp(&Utc::now());
        let mut tx = self.pool.begin().await?;
        for (user, friend) in [(a, b), (b, a)] {
            sqlx::query("INSERT OR IGNORE INTO users (uid, online, updated_at) VALUES (?, 0, ?)")
                .bind(user)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?, ?)")
                .bind(user)
                .bind(friend)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Conversation history between two identities, oldest first.
    pub async fn messages_between(&self, a: &str, b: &str) -> StoreResult<Vec<StoredMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, sender_id, receiver_id, text, timestamp FROM messages
             WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)
             ORDER BY timestamp ASC",
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, sender_id, receiver_id, text, timestamp)| {
                Ok(StoredMessage {
                    id,
                    sender_id,
                    receiver_id,
                    text,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Fixed-width so that lexical order in SQL matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}

#[async_trait]
impl PersistenceGateway for SqliteStore {
    async fn get_user(&self, uid: &str) -> StoreResult<Option<UserRecord>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT uid, name, photo_url, online, updated_at FROM users WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        let Some((uid, name, photo_url, online, updated_at)) = row else {
            return Ok(None);
        };

        let friends: Vec<(String,)> =
            sqlx::query_as("SELECT friend_id FROM friendships WHERE user_id = ?")
                .bind(&uid)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(UserRecord {
            uid,
            name,
            photo_url,
            online,
            friends: friends.into_iter().map(|(friend,)| friend).collect(),
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    async fn upsert_user(&self, uid: &str, fields: &UserFields) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (uid, name, photo_url, online, updated_at)
            VALUES (?1, ?2, ?3, COALESCE(?4, 0), ?5)
            ON CONFLICT(uid) DO UPDATE SET
                name = COALESCE(?2, name),
                photo_url = COALESCE(?3, photo_url),
                online = COALESCE(?4, online),
                updated_at = ?5
            "#,
        )
        .bind(uid)
        .bind(&fields.name)
        .bind(&fields.photo_url)
        .bind(fields.online)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_online(&self, uid: &str, online: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET online = ?, updated_at = ? WHERE uid = ?")
            .bind(online)
            .bind(format_timestamp(&Utc::now()))
            .bind(uid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(uid.to_string()));
        }
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

        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, text, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&stored.id)
        .bind(&stored.sender_id)
        .bind(&stored.receiver_id)
        .bind(&stored.text)
        .bind(format_timestamp(&stored.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }
}
