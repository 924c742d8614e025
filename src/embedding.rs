//! Embedding provider seam.
//!
//! The engine only depends on this trait; concrete backends (the
//! OpenAI-compatible HTTP shim in [`crate::llm::openai`], or anything the
//! caller injects) live behind it. The contract the pipeline relies on:
//! deterministic output for a fixed `model_id`, order-preserving batches,
//! and transient failures signalled as [`RagError::EmbeddingUnavailable`].

use async_trait::async_trait;

use crate::core::errors::RagError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the embedding model (provider version). Vectors from
    /// different model ids must never be mixed in one index.
    fn model_id(&self) -> &str;

    /// Dimensionality of every vector this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed a batch of texts. The output order matches the input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
