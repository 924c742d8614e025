//! In-memory [`ConversationStore`] for tests and single-process use.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::errors::RagError;

use super::{now_rfc3339, ConversationStore, Role, Turn};

#[derive(Default)]
struct SessionLog {
    next_seq: u64,
    turns: Vec<Turn>,
}

impl SessionLog {
    fn push(&mut self, role: Role, content: &str, citations: &[String]) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.turns.push(Turn {
            role,
            content: content.to_string(),
            citations: citations.to_vec(),
            seq,
            created_at: now_rfc3339(),
        });
        seq
    }
}

/// Sessions behind one async mutex: appends to the same session are
/// serialized, and an exchange appends both turns under a single lock hold.
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: Mutex<HashMap<String, SessionLog>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        citations: &[String],
    ) -> Result<u64, RagError> {
        let mut sessions = self.sessions.lock().await;
        let log = sessions.entry(session_id.to_string()).or_default();
        Ok(log.push(role, content, citations))
    }

    async fn append_exchange(
        &self,
        session_id: &str,
        user_content: &str,
        assistant_content: &str,
        citations: &[String],
    ) -> Result<(), RagError> {
        let mut sessions = self.sessions.lock().await;
        let log = sessions.entry(session_id.to_string()).or_default();
        log.push(Role::User, user_content, &[]);
        log.push(Role::Assistant, assistant_content, citations);
        Ok(())
    }

    async fn history(&self, session_id: &str, max_turns: usize) -> Result<Vec<Turn>, RagError> {
        let sessions = self.sessions.lock().await;
        let Some(log) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };

        let turns = &log.turns;
        let start = if max_turns == 0 || max_turns >= turns.len() {
            0
        } else {
            turns.len() - max_turns
        };
        Ok(turns[start..].to_vec())
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, RagError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_are_ordered() {
        let store = InMemoryConversationStore::new();
        store.append("s1", Role::User, "one", &[]).await.unwrap();
        store.append("s1", Role::Assistant, "two", &[]).await.unwrap();

        let turns = store.history("s1", 0).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].seq, 0);
        assert_eq!(turns[1].seq, 1);
        assert_eq!(turns[0].role, Role::User);
    }

    #[tokio::test]
    async fn history_truncation_is_a_suffix() {
        let store = InMemoryConversationStore::new();
        for i in 0..6 {
            store
                .append("s1", Role::User, &format!("turn {i}"), &[])
                .await
                .unwrap();
        }

        let recent = store.history("s1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "turn 4");
        assert_eq!(recent[1].content, "turn 5");
        // contiguous seqs, no gaps
        assert_eq!(recent[1].seq, recent[0].seq + 1);
    }

    #[tokio::test]
    async fn no_cross_session_leakage() {
        let store = InMemoryConversationStore::new();
        store.append("s1", Role::User, "secret", &[]).await.unwrap();

        assert!(store.history("s2", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exchange_is_atomic_pair() {
        let store = InMemoryConversationStore::new();
        store
            .append_exchange("s1", "question", "answer", &["d1#0".to_string()])
            .await
            .unwrap();

        let turns = store.history("s1", 0).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert!(turns[0].citations.is_empty());
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].citations, vec!["d1#0".to_string()]);
    }

    #[tokio::test]
    async fn delete_session_removes_history() {
        let store = InMemoryConversationStore::new();
        store.append("s1", Role::User, "hi", &[]).await.unwrap();

        assert!(store.delete_session("s1").await.unwrap());
        assert!(!store.delete_session("s1").await.unwrap());
        assert!(store.history("s1", 0).await.unwrap().is_empty());
    }
}
