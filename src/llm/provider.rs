use async_trait::async_trait;

use crate::core::errors::RagError;

use super::types::ChatRequest;

/// Generative model seam.
///
/// A single completion call; the orchestrator owns retry policy. Transient
/// upstream failures surface as [`RagError::GenerationFailed`] (retryable),
/// anything else is treated as fatal to the request.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Provider name for logging (e.g. "openai", "lmstudio").
    fn name(&self) -> &str;

    /// Chat completion (non-streaming).
    async fn complete(&self, request: ChatRequest) -> Result<String, RagError>;
}
