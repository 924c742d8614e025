//! SQLite-backed [`ConversationStore`].
//!
//! `sessions` and `messages` tables with cascade deletion; the session row
//! is created lazily on first append. The suffix query fetches the newest
//! `n` rows descending and re-sorts ascending, so truncation always drops
//! the oldest turns.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::RagError;

use super::{now_rfc3339, ConversationStore, Role, Turn};

/// Session summary for listing UIs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub turn_count: i64,
}

#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                citations TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_seq ON messages(session_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(())
    }

    async fn insert_turn(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        session_id: &str,
        role: Role,
        content: &str,
        citations: &[String],
        now: &str,
    ) -> Result<u64, RagError> {
        let seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(RagError::storage)?;

        let citations_json =
            serde_json::to_string(citations).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            "INSERT INTO messages (session_id, seq, role, content, citations, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(session_id)
        .bind(seq)
        .bind(role.as_str())
        .bind(content)
        .bind(&citations_json)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(RagError::storage)?;

        Ok(seq as u64)
    }

    async fn touch_session(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        session_id: &str,
        now: &str,
    ) -> Result<(), RagError> {
        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at, updated_at) VALUES (?1, ?2, ?2)")
            .bind(session_id)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(RagError::storage)?;

        sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(session_id)
            .execute(&mut **tx)
            .await
            .map_err(RagError::storage)?;

        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, RagError> {
        let role = Role::parse(&row.get::<String, _>("role"))?;
        let citations_json: String = row.get("citations");
        let citations: Vec<String> = serde_json::from_str::<Value>(&citations_json)
            .ok()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Ok(Turn {
            role,
            content: row.get("content"),
            citations,
            seq: row.get::<i64, _>("seq") as u64,
            created_at: row.get("created_at"),
        })
    }

    /// Sessions ordered by last activity, most recent first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, RagError> {
        let rows = sqlx::query(
            "SELECT s.id, s.created_at, s.updated_at, COUNT(m.id) AS turn_count
             FROM sessions s
             LEFT JOIN messages m ON s.id = m.session_id
             GROUP BY s.id
             ORDER BY s.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(rows
            .iter()
            .map(|row| SessionInfo {
                id: row.get("id"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                turn_count: row.get("turn_count"),
            })
            .collect())
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        citations: &[String],
    ) -> Result<u64, RagError> {
        let now = now_rfc3339();
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        Self::touch_session(&mut tx, session_id, &now).await?;
        let seq = Self::insert_turn(&mut tx, session_id, role, content, citations, &now).await?;

        tx.commit().await.map_err(RagError::storage)?;
        Ok(seq)
    }

    async fn append_exchange(
        &self,
        session_id: &str,
        user_content: &str,
        assistant_content: &str,
        citations: &[String],
    ) -> Result<(), RagError> {
        let now = now_rfc3339();
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        Self::touch_session(&mut tx, session_id, &now).await?;
        Self::insert_turn(&mut tx, session_id, Role::User, user_content, &[], &now).await?;
        Self::insert_turn(
            &mut tx,
            session_id,
            Role::Assistant,
            assistant_content,
            citations,
            &now,
        )
        .await?;

        tx.commit().await.map_err(RagError::storage)?;
        Ok(())
    }

    async fn history(&self, session_id: &str, max_turns: usize) -> Result<Vec<Turn>, RagError> {
        let rows = if max_turns > 0 {
            sqlx::query(
                "SELECT * FROM (
                     SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2
                 ) ORDER BY seq ASC",
            )
            .bind(session_id)
            .bind(max_turns as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::storage)?
        } else {
            sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(RagError::storage)?
        };

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, RagError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteConversationStore {
        let tmp =
            std::env::temp_dir().join(format!("ragkit-history-test-{}.db", uuid::Uuid::new_v4()));
        SqliteConversationStore::with_path(tmp).await.unwrap()
    }

    #[tokio::test]
    async fn append_assigns_contiguous_seqs() {
        let store = test_store().await;
        assert_eq!(store.append("s1", Role::User, "one", &[]).await.unwrap(), 0);
        assert_eq!(
            store.append("s1", Role::Assistant, "two", &[]).await.unwrap(),
            1
        );
        assert_eq!(store.append("s2", Role::User, "other", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn history_suffix_with_limit() {
        let store = test_store().await;
        for i in 0..5 {
            store
                .append("s1", Role::User, &format!("turn {i}"), &[])
                .await
                .unwrap();
        }

        let recent = store.history("s1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "turn 3");
        assert_eq!(recent[1].content, "turn 4");

        let all = store.history("s1", 0).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn exchange_roundtrips_citations() {
        let store = test_store().await;
        store
            .append_exchange(
                "s1",
                "What is the policy?",
                "Thirty days.",
                &["doc-1#2".to_string(), "doc-1#3".to_string()],
            )
            .await
            .unwrap();

        let turns = store.history("s1", 0).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].citations.len(), 2);
        assert_eq!(turns[1].citations[0], "doc-1#2");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = test_store().await;
        store.append("s1", Role::User, "mine", &[]).await.unwrap();
        assert!(store.history("s2", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let store = test_store().await;
        store.append("s1", Role::User, "hi", &[]).await.unwrap();

        assert!(store.delete_session("s1").await.unwrap());
        assert!(store.history("s1", 0).await.unwrap().is_empty());

        // seq numbering restarts for a recreated session
        assert_eq!(store.append("s1", Role::User, "again", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_sessions_counts_turns() {
        let store = test_store().await;
        store.append_exchange("s1", "q", "a", &[]).await.unwrap();
        store.append("s2", Role::User, "solo", &[]).await.unwrap();

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        let s1 = sessions.iter().find(|s| s.id == "s1").unwrap();
        assert_eq!(s1.turn_count, 2);
    }
}
