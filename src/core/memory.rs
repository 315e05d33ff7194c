//! Conversation memory backed by an in-memory SQLite database
//!
//! History lives as long as the process does. Each session id owns an ordered
//! list of messages; a completed turn is written as one transaction so a
//! session never holds a user message without its reply.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::conversation::{Message, Role};

/// A stored message with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Message {
            role: stored.role,
            content: stored.content,
        }
    }
}

/// Per-session conversation memory
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    /// Open a fresh, empty store.
    ///
    /// Every SQLite connection to `:memory:` sees its own database, so the
    /// pool is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages(session_id, id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one completed exchange.
    pub async fn append_turn(
        &self,
        session_id: &str,
        user: &Message,
        reply: &Message,
    ) -> Result<(), sqlx::Error> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        for message in [user, reply] {
            sqlx::query(
                r#"
                INSERT INTO messages (session_id, role, content, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    /// Messages of a session in insertion order
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>, sqlx::Error> {
        Ok(self
            .entries(session_id)
            .await?
            .into_iter()
            .map(Message::from)
            .collect())
    }

    /// Messages of a session with their storage metadata
    pub async fn entries(&self, session_id: &str) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let rows: Vec<(i64, String, String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM messages
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, session_id, role, content, created_at)| StoredMessage {
                id,
                session_id,
                role: Role::parse(&role),
                content,
                created_at,
            })
            .collect())
    }

    pub async fn len(&self, session_id: &str) -> Result<usize, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as usize)
    }

    /// Drop a session's history, returning how many messages were removed.
    pub async fn clear(&self, session_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = MemoryStore::in_memory().await.unwrap();

        store
            .append_turn("s1", &Message::user("Hello"), &Message::assistant("Hi there!"))
            .await
            .unwrap();
        store
            .append_turn("s1", &Message::user("Bye"), &Message::assistant("Goodbye!"))
            .await
            .unwrap();

        let history = store.history("s1").await.unwrap();
        assert_eq!(
            history,
            vec![
                Message::user("Hello"),
                Message::assistant("Hi there!"),
                Message::user("Bye"),
                Message::assistant("Goodbye!"),
            ]
        );
        assert_eq!(store.len("s1").await.unwrap(), 4);

        let entries = store.entries("s1").await.unwrap();
        assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
        assert!(entries.iter().all(|e| e.session_id == "s1"));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = MemoryStore::in_memory().await.unwrap();

        store
            .append_turn("a", &Message::user("one"), &Message::assistant("1"))
            .await
            .unwrap();
        store
            .append_turn("b", &Message::user("two"), &Message::assistant("2"))
            .await
            .unwrap();

        assert_eq!(store.len("a").await.unwrap(), 2);
        assert_eq!(store.history("b").await.unwrap()[0].content, "two");
        assert_eq!(store.len("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::in_memory().await.unwrap();

        store
            .append_turn("a", &Message::user("one"), &Message::assistant("1"))
            .await
            .unwrap();
        store
            .append_turn("b", &Message::user("two"), &Message::assistant("2"))
            .await
            .unwrap();

        assert_eq!(store.clear("a").await.unwrap(), 2);
        assert_eq!(store.len("a").await.unwrap(), 0);
        assert_eq!(store.len("b").await.unwrap(), 2);
        assert_eq!(store.clear("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_stores_do_not_share_state() {
        let first = MemoryStore::in_memory().await.unwrap();
        first
            .append_turn("a", &Message::user("one"), &Message::assistant("1"))
            .await
            .unwrap();

        let second = MemoryStore::in_memory().await.unwrap();
        assert_eq!(second.len("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_timestamp_is_an_error() {
        let store = MemoryStore::in_memory().await.unwrap();

        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind("a")
        .bind("user")
        .bind("hello")
        .bind("yesterday-ish")
        .execute(&store.pool)
        .await
        .unwrap();

        assert!(store.entries("a").await.is_err());
        assert!(store.history("a").await.is_err());
    }

    #[tokio::test]
    async fn test_timestamps_round_trip() {
        let store = MemoryStore::in_memory().await.unwrap();
        let before = Utc::now();

        store
            .append_turn("a", &Message::user("one"), &Message::assistant("1"))
            .await
            .unwrap();

        let entries = store.entries("a").await.unwrap();
        assert_eq!(entries[0].created_at, entries[1].created_at);
        assert!(entries[0].created_at >= before - chrono::Duration::seconds(1));
        assert!(entries[0].created_at <= Utc::now());
    }
}
