//! Durable, append-only message log.
//!
//! The trait is the seam between the router and storage: production uses
//! SQLite, tests can substitute a store that fails on demand. There is no
//! cache; every read goes to the database.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{types::Type, OptionalExtension, Row};

use crate::db::models::{Message, NewMessage, Origin};
use crate::db::{self, DbPool};
use crate::error::StoreError;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Validate, assign id and timestamp, persist, return the stored record.
    async fn append(&self, new: NewMessage) -> Result<Message, StoreError>;

    /// All messages between `a` and `b` in either direction, oldest first.
    async fn find_conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError>;

    /// Set the read flag. Already-read and unknown ids are no-ops.
    async fn mark_read(&self, id: &str) -> Result<(), StoreError>;

    /// Fetch a single message by id.
    async fn get(&self, id: &str) -> Result<Option<Message>, StoreError>;
}

/// Reject input the schema must never contain.
pub fn validate_new_message(new: &NewMessage) -> Result<(), StoreError> {
    if new.text.trim().is_empty() {
        return Err(StoreError::Validation("message text must not be empty".into()));
    }
    if new.sender_id.trim().is_empty() {
        return Err(StoreError::Validation("sender id must not be empty".into()));
    }
    if matches!(new.receiver_id.as_deref(), Some(r) if r.trim().is_empty()) {
        return Err(StoreError::Validation("receiver id must not be blank".into()));
    }
    Ok(())
}

const SELECT_COLUMNS: &str = "SELECT id, sender_id, receiver_id, text, origin, timestamp, is_read FROM messages";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let origin: String = row.get(4)?;
    let origin = Origin::parse(&origin).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown message origin '{}'", origin).into(),
        )
    })?;

    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        origin,
        timestamp: row.get(5)?,
        is_read: row.get::<_, i64>(6)? != 0,
    })
}

/// SQLite-backed message store. Statements run on the blocking pool.
#[derive(Clone)]
pub struct SqliteMessageStore {
    db: DbPool,
}

impl SqliteMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Open (or create) `shopchat.db` inside `data_dir`.
    pub fn open(data_dir: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::new(db::init_db(data_dir)?))
    }

    pub fn open_in_memory() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::new(db::init_in_memory()?))
    }
}

fn lock_poisoned() -> StoreError {
    StoreError::Database("database lock poisoned".into())
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, new: NewMessage) -> Result<Message, StoreError> {
        validate_new_message(&new)?;
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> Result<Message, StoreError> {
            let conn = db.lock().map_err(|_| lock_poisoned())?;

            // Clamp to previous + 1 so timestamps stay strictly increasing
            // even when the wall clock stalls or steps backwards.
            let last: Option<i64> =
                conn.query_row("SELECT MAX(timestamp) FROM messages", [], |row| row.get(0))?;
            let now = Utc::now();
            let timestamp = match last {
                Some(prev) if prev >= now.timestamp_millis() => prev + 1,
                _ => now.timestamp_millis(),
            };

            let message = Message {
                id: uuid::Uuid::now_v7().to_string(),
                sender_id: new.sender_id,
                receiver_id: new.receiver_id,
                text: new.text,
                origin: new.origin,
                timestamp,
                is_read: false,
            };

            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, origin, timestamp, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![
                    message.id,
                    message.sender_id,
                    message.receiver_id,
                    message.text,
                    message.origin.as_str(),
                    message.timestamp,
                    now.to_rfc3339(),
                ],
            )?;

            Ok(message)
        })
        .await?
    }

    async fn find_conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        let db = self.db.clone();
        let a = a.to_string();
        let b = b.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<Message>, StoreError> {
            let conn = db.lock().map_err(|_| lock_poisoned())?;
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS}
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY timestamp ASC, id ASC"
            ))?;

            let messages = stmt
                .query_map(rusqlite::params![a, b], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await?
    }

    async fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = db.lock().map_err(|_| lock_poisoned())?;
            conn.execute(
                "UPDATE messages SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                rusqlite::params![id],
            )?;
            Ok(())
        })
        .await?
    }

    async fn get(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let db = self.db.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Message>, StoreError> {
            let conn = db.lock().map_err(|_| lock_poisoned())?;
            let message = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    rusqlite::params![id],
                    row_to_message,
                )
                .optional()?;
            Ok(message)
        })
        .await?
    }
}
