//! Message store and user directory.
//!
//! [`MessageStore`] is the seam the relay writes through; [`SqliteStore`] is
//! the production implementation over [`Db`].

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;

use crate::db::{Db, MessageRow, UserRow};
use crate::error::StoreError;

/// A stored chat message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Server-assigned, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub body: String,
}

impl PersistedMessage {
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_ms).unwrap_or_default()
    }

    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl From<MessageRow> for PersistedMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender,
            receiver_id: row.receiver,
            timestamp_ms: row.timestamp_ms,
            body: row.text,
        }
    }
}

/// Latest activity with one counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub counterparty: String,
    pub last_timestamp_ms: i64,
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self { uid: row.uid, email: row.email, display_name: row.display_name }
    }
}

/// Durable, append-only message persistence.
pub trait MessageStore: Send + Sync {
    /// Persist a message. The timestamp is assigned here and is never lower
    /// than any earlier one; `client_timestamp_hint` is not trusted.
    fn append(
        &self,
        sender: &str,
        receiver: &str,
        body: &str,
        client_timestamp_hint: Option<&str>,
    ) -> Result<PersistedMessage, StoreError>;

    /// Up to `limit` most recent messages between two users, oldest first.
    fn recent_between(
        &self,
        a: &str,
        b: &str,
        limit: usize,
        before_ms: Option<i64>,
    ) -> Result<Vec<PersistedMessage>, StoreError>;

    /// Counterparties with their latest message time, most recent first.
    fn recent_counterparties(&self, user: &str, limit: usize) -> Result<Vec<ConversationSummary>, StoreError>;
}

/// SQLite-backed store.
pub struct SqliteStore {
    db: Mutex<Db>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self { db: Mutex::new(Db::open(path)?) })
    }

    pub fn open_memory() -> Result<Self, StoreError> {
        Ok(Self { db: Mutex::new(Db::open_memory()?) })
    }

    /// Record the caller's profile. Fields left out keep their stored value.
    pub fn upsert_user(
        &self,
        uid: &str,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<UserProfile, StoreError> {
        self.db
            .lock()
            .upsert_user(uid, email, display_name)
            .map(UserProfile::from)
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict("email already registered to another user".to_string())
                }
                other => StoreError::Sqlite(other),
            })
    }

    pub fn find_user(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.db.lock().get_user(uid)?.map(UserProfile::from))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.db.lock().get_user_by_email(email.trim())?.map(UserProfile::from))
    }
}

impl MessageStore for SqliteStore {
    fn append(
        &self,
        sender: &str,
        receiver: &str,
        body: &str,
        client_timestamp_hint: Option<&str>,
    ) -> Result<PersistedMessage, StoreError> {
        if let Some(hint) = client_timestamp_hint {
            tracing::trace!(%sender, hint, "ignoring client timestamp");
        }
        let row = self.db.lock().insert_message(sender, receiver, body)?;
        Ok(row.into())
    }

    fn recent_between(
        &self,
        a: &str,
        b: &str,
        limit: usize,
        before_ms: Option<i64>,
    ) -> Result<Vec<PersistedMessage>, StoreError> {
        let rows = self.db.lock().get_dm_messages(a, b, limit, before_ms)?;
        Ok(rows.into_iter().map(PersistedMessage::from).collect())
    }

    fn recent_counterparties(&self, user: &str, limit: usize) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = self.db.lock().dm_conversations(user, limit)?;
        Ok(rows
            .into_iter()
            .map(|(counterparty, last_timestamp_ms)| ConversationSummary { counterparty, last_timestamp_ms })
            .collect())
    }
}
