//! Grounded prompt assembly.
//!
//! Builds the message list handed to the generative model: instruction
//! preamble, grounding excerpts with provenance labels, conversation
//! history fitted to a token budget (oldest turns dropped first), and the
//! new user message. Token counts are the usual 4-chars-per-token estimate;
//! budgets here bound prompt growth, they are not exact accounting.

use crate::core::config::PromptConfig;
use crate::history::Turn;
use crate::index::SearchHit;
use crate::llm::ChatMessage;

pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Assemble the full prompt for one request.
    pub fn build(
        &self,
        history: &[Turn],
        grounding: &[SearchHit],
        user_message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.config.preamble.clone())];

        if grounding.is_empty() {
            messages.push(ChatMessage::system(
                "No supporting excerpts were found in the indexed documents. \
                 Tell the user when you cannot answer from the documents.",
            ));
        } else {
            messages.push(ChatMessage::system(format!(
                "Context excerpts:\n\n{}",
                self.format_grounding(grounding)
            )));
        }

        for turn in self.fit_history(history) {
            messages.push(ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }

        messages.push(ChatMessage::user(user_message));
        messages
    }

    /// Numbered excerpts with provenance, bounded by `max_context_chars`.
    pub fn format_grounding(&self, grounding: &[SearchHit]) -> String {
        let mut out = String::new();
        let mut used = 0usize;

        for (i, hit) in grounding.iter().enumerate() {
            let entry = format!(
                "[{}] (source: {}, chunk {}, chars {}-{})\n{}\n\n",
                i + 1,
                hit.chunk.document_id,
                hit.chunk.chunk_index,
                hit.chunk.start_offset,
                hit.chunk.end_offset,
                hit.chunk.text.trim()
            );
            if used + entry.len() > self.config.max_context_chars && used > 0 {
                tracing::debug!("grounding truncated at {} of {} excerpts", i, grounding.len());
                break;
            }
            used += entry.len();
            out.push_str(&entry);
        }

        out.trim_end().to_string()
    }

    /// Keep the most recent turns that fit the token budget, preserving
    /// chronological order. Oldest turns are dropped first.
    fn fit_history<'a>(&self, history: &'a [Turn]) -> Vec<&'a Turn> {
        let budget = self.config.history_token_budget;
        let mut kept: Vec<&Turn> = Vec::new();
        let mut used = 0usize;

        for turn in history.iter().rev() {
            let tokens = estimate_tokens(&turn.content);
            if used + tokens > budget {
                break;
            }
            used += tokens;
            kept.push(turn);
        }

        kept.reverse();
        kept
    }
}

/// Rough token estimate: ~4 characters per token.
pub(crate) fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}
