//! Conversation state: per-session ordered turns.
//!
//! Sessions are append-only during their lifetime; `history` returns a
//! suffix (most recent turns first dropped from the oldest end), never a
//! reordered or gapped subsequence. The orchestrator records a user turn
//! and its assistant reply through `append_exchange`, which is atomic so a
//! failed request can never leave half an exchange behind.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

pub use memory::InMemoryConversationStore;
pub use sqlite::SqliteConversationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, RagError> {
        match raw {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(RagError::Storage(format!("unknown turn role '{other}'"))),
        }
    }
}

/// One message in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Chunk ids cited by an assistant turn; empty for user turns.
    pub citations: Vec<String>,
    /// Position within the session, starting at 0.
    pub seq: u64,
    pub created_at: String,
}

/// Abstract conversation store.
///
/// Appends to the same session are serialized by the implementation; a
/// session's turns are only visible under its own id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one turn; returns its assigned sequence number.
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        citations: &[String],
    ) -> Result<u64, RagError>;

    /// Append a user turn and the assistant reply as one atomic unit.
    async fn append_exchange(
        &self,
        session_id: &str,
        user_content: &str,
        assistant_content: &str,
        citations: &[String],
    ) -> Result<(), RagError>;

    /// The most recent `max_turns` turns in chronological order
    /// (`0` returns the full history).
    async fn history(&self, session_id: &str, max_turns: usize) -> Result<Vec<Turn>, RagError>;

    /// Drop a session and its turns. Returns whether it existed.
    async fn delete_session(&self, session_id: &str) -> Result<bool, RagError>;
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
