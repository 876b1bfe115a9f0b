//! SQLite persistence layer.
//!
//! Stores direct-message history and the user directory.
//! Uses WAL mode for concurrent reads during writes.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Result as SqlResult, params};

use crate::msgid;

/// Database handle wrapping a SQLite connection.
pub struct Db {
    conn: Connection,
    /// Highest timestamp handed out so far. New messages never go below it.
    last_timestamp_ms: i64,
}

/// A persisted message row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    /// Insertion sequence; breaks timestamp ties.
    pub seq: i64,
    /// ULID message id.
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub timestamp_ms: i64,
}

/// A user directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub updated_at_ms: i64,
}

/// Canonical conversation key for a pair of users, independent of direction.
pub fn canonical_dm_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("dm:{a},{b}")
    } else {
        format!("dm:{b},{a}")
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Db {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS messages (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT NOT NULL UNIQUE,
                sender       TEXT NOT NULL,
                receiver     TEXT NOT NULL,
                conversation TEXT NOT NULL,
                text         TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation, timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_messages_sender
                ON messages(sender, timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_messages_receiver
                ON messages(receiver, timestamp_ms);

            CREATE TABLE IF NOT EXISTS users (
                uid           TEXT PRIMARY KEY,
                email         TEXT UNIQUE COLLATE NOCASE,
                display_name  TEXT,
                updated_at_ms INTEGER NOT NULL
            );
            ",
        )?;
        let last_timestamp_ms: i64 = conn.query_row(
            "SELECT COALESCE(MAX(timestamp_ms), 0) FROM messages",
            [],
            |row| row.get(0),
        )?;
        Ok(Self { conn, last_timestamp_ms })
    }

    // ── Messages ───────────────────────────────────────────────────────

    /// Next server timestamp: the wall clock, held at the last assigned
    /// value if the clock stepped backwards.
    fn next_timestamp(&mut self) -> i64 {
        let ts = now_ms().max(self.last_timestamp_ms);
        self.last_timestamp_ms = ts;
        ts
    }

    /// Store a message with a server-assigned timestamp and id.
    pub fn insert_message(&mut self, sender: &str, receiver: &str, text: &str) -> SqlResult<MessageRow> {
        let timestamp_ms = self.next_timestamp();
        let id = msgid::generate(timestamp_ms);
        self.conn.execute(
            "INSERT INTO messages (id, sender, receiver, conversation, text, timestamp_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, sender, receiver, canonical_dm_key(sender, receiver), text, timestamp_ms],
        )?;
        Ok(MessageRow {
            seq: self.conn.last_insert_rowid(),
            id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            text: text.to_string(),
            timestamp_ms,
        })
    }

    /// Most recent messages between two users, ordered oldest-first.
    /// `before`: if Some, only messages with timestamp < this value (for pagination).
    pub fn get_dm_messages(
        &self,
        a: &str,
        b: &str,
        limit: usize,
        before: Option<i64>,
    ) -> SqlResult<Vec<MessageRow>> {
        let key = canonical_dm_key(a, b);
        let mut stmt = self.conn.prepare(
            "SELECT seq, id, sender, receiver, text, timestamp_ms
             FROM messages
             WHERE conversation = ?1 AND timestamp_ms < ?2
             ORDER BY timestamp_ms DESC, seq DESC
             LIMIT ?3",
        )?;
        let before = before.unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![key, before, limit as i64], map_message_row)?;
        let mut result = rows.collect::<SqlResult<Vec<_>>>()?;
        result.reverse();
        Ok(result)
    }

    /// Counterparties of `user` with the timestamp of the latest message
    /// exchanged, most recent first.
    pub fn dm_conversations(&self, user: &str, limit: usize) -> SqlResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT CASE WHEN sender = ?1 THEN receiver ELSE sender END AS other,
                    MAX(timestamp_ms) AS last_ts,
                    MAX(seq) AS last_seq
             FROM messages
             WHERE sender = ?1 OR receiver = ?1
             GROUP BY other
             ORDER BY last_ts DESC, last_seq DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        rows.collect()
    }

    // ── Users ──────────────────────────────────────────────────────────

    /// Create or update a directory entry. Absent fields keep their
    /// stored value.
    pub fn upsert_user(&self, uid: &str, email: Option<&str>, display_name: Option<&str>) -> SqlResult<UserRow> {
        self.conn.execute(
            "INSERT INTO users (uid, email, display_name, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(uid) DO UPDATE SET
                email = COALESCE(excluded.email, users.email),
                display_name = COALESCE(excluded.display_name, users.display_name),
                updated_at_ms = excluded.updated_at_ms",
            params![uid, email, display_name, now_ms()],
        )?;
        self.get_user(uid)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_user(&self, uid: &str) -> SqlResult<Option<UserRow>> {
        self.conn
            .query_row(
                "SELECT uid, email, display_name, updated_at_ms FROM users WHERE uid = ?1",
                params![uid],
                map_user_row,
            )
            .optional()
    }

    /// Look up by email, ignoring case.
    pub fn get_user_by_email(&self, email: &str) -> SqlResult<Option<UserRow>> {
        self.conn
            .query_row(
                "SELECT uid, email, display_name, updated_at_ms FROM users WHERE email = ?1",
                params![email],
                map_user_row,
            )
            .optional()
    }
}

fn map_message_row(row: &rusqlite::Row) -> SqlResult<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        sender: row.get(2)?,
        receiver: row.get(3)?,
        text: row.get(4)?,
        timestamp_ms: row.get(5)?,
    })
}

fn map_user_row(row: &rusqlite::Row) -> SqlResult<UserRow> {
    Ok(UserRow {
        uid: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        updated_at_ms: row.get(3)?,
    })
}
