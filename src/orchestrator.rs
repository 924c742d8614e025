//! Grounded answer orchestration.
//!
//! One `answer` call is one pipeline invocation: fetch history, reformulate
//! the query against that history, retrieve grounding, assemble the bounded
//! prompt, invoke the model (with bounded retry on transient failures), and
//! record the exchange. The turn append happens strictly after a successful
//! generation and as a single atomic store call, so a cancelled or failed
//! request never leaves half an exchange in the conversation state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::config::{GenerationConfig, PromptConfig};
use crate::core::errors::RagError;
use crate::core::retry::with_backoff;
use crate::history::ConversationStore;
use crate::index::SearchHit;
use crate::llm::{ChatMessage, ChatRequest, GenerativeModel};
use crate::prompt::PromptBuilder;
use crate::retriever::Retriever;

/// Instruction for condensing a follow-up question into a standalone one.
const CONDENSE_PROMPT: &str =
    "Given the chat history and the latest user question, which may reference \
     earlier context, reformulate the question so it can be understood on its \
     own. Do not answer it; return the reformulated question, or the original \
     question unchanged if it already stands alone.";

/// A grounding reference attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub score: f32,
}

impl From<&SearchHit> for Citation {
    fn from(hit: &SearchHit) -> Self {
        Self {
            chunk_id: hit.chunk.chunk_id.clone(),
            document_id: hit.chunk.document_id.clone(),
            chunk_index: hit.chunk.chunk_index,
            start_offset: hit.chunk.start_offset,
            end_offset: hit.chunk.end_offset,
            score: hit.score,
        }
    }
}

/// The assistant reply plus the grounding that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub session_id: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    /// False when retrieval found nothing above the relevance threshold.
    pub grounded: bool,
}

pub struct Orchestrator {
    model: Arc<dyn GenerativeModel>,
    retriever: Retriever,
    history: Arc<dyn ConversationStore>,
    prompt: PromptBuilder,
    prompt_config: PromptConfig,
    generation: GenerationConfig,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        retriever: Retriever,
        history: Arc<dyn ConversationStore>,
        prompt_config: PromptConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            model,
            retriever,
            history,
            prompt: PromptBuilder::new(prompt_config.clone()),
            prompt_config,
            generation,
        }
    }

    /// Answer `user_message` within the session, grounded in retrieved
    /// chunks. Empty retrieval still produces an answer (ungrounded);
    /// transient generation failures are retried, then surfaced without
    /// touching the conversation state.
    pub async fn answer(
        &self,
        session_id: &str,
        user_message: &str,
    ) -> Result<ChatAnswer, RagError> {
        let history = self
            .history
            .history(session_id, self.prompt_config.max_history_turns)
            .await?;

        let query = if history.is_empty() {
            user_message.to_string()
        } else {
            self.reformulate(&history, user_message).await
        };

        let grounding = self.retriever.retrieve(&query, None).await?;
        if grounding.is_empty() {
            tracing::info!("no grounding above threshold for session {session_id}");
        }

        let messages = self.prompt.build(&history, &grounding, user_message);
        let reply = with_backoff(
            "generation",
            self.generation.max_retries,
            Duration::from_millis(self.generation.retry_backoff_ms),
            || self.model.complete(ChatRequest::new(messages.clone())),
        )
        .await?;

        let citations: Vec<Citation> = grounding.iter().map(Citation::from).collect();
        let citation_ids: Vec<String> = citations.iter().map(|c| c.chunk_id.clone()).collect();

        self.history
            .append_exchange(session_id, user_message, &reply, &citation_ids)
            .await?;

        Ok(ChatAnswer {
            session_id: session_id.to_string(),
            answer: reply,
            grounded: !citations.is_empty(),
            citations,
        })
    }

    /// Condense a follow-up into a standalone retrieval query. Falls back
    /// to the raw message on any failure so retrieval is never blocked by
    /// the reformulation call.
    async fn reformulate(&self, history: &[crate::history::Turn], user_message: &str) -> String {
        let mut messages = vec![ChatMessage::system(CONDENSE_PROMPT)];
        for turn in history {
            messages.push(ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }
        messages.push(ChatMessage::user(user_message));

        match self.model.complete(ChatRequest::new(messages)).await {
            Ok(condensed) if !condensed.trim().is_empty() => condensed.trim().to_string(),
            Ok(_) => user_message.to_string(),
            Err(e) => {
                tracing::warn!("query reformulation failed, using raw message: {e}");
                user_message.to_string()
            }
        }
    }
}
