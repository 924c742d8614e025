use thiserror::Error;

/// Crate-wide error type for the RAG engine.
///
/// Variants map onto the failure taxonomy of the pipeline: per-document
/// ingestion failures, caller misconfiguration, transient upstream failures
/// (eligible for retry), and systemic index faults that require re-indexing
/// before the engine is usable again.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt source: {0}")]
    CorruptSource(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("dimension mismatch: index holds {expected}-dim vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index was built with embedder '{indexed}' but '{current}' was supplied; re-index required")]
    IndexVersionMismatch { indexed: String, current: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    /// Whether this is a transient upstream failure eligible for retry
    /// with backoff. Everything else is fatal to the call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingUnavailable(_) | RagError::GenerationFailed(_)
        )
    }
}
