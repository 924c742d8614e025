//! Vector index: chunk vectors plus metadata, nearest-neighbor queries.
//!
//! Two implementations share the trait: an in-memory index for tests and
//! ephemeral use, and a SQLite-backed index for durable storage. Both honor
//! the same contract: per-document atomicity on insert/delete, a signature
//! (embedding model + dimensionality) pinned at first insert, and ranked
//! cosine search with insertion-order tie-breaking.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteVectorIndex;

/// Embedding provenance pinned to an index at first insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSignature {
    pub model_id: String,
    pub dimensions: usize,
}

/// A stored chunk with citation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable id, derived as `"{document_id}#{chunk_index}"`.
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl ChunkRecord {
    pub fn id_for(document_id: &str, chunk_index: usize) -> String {
        format!("{document_id}#{chunk_index}")
    }
}

/// One ranked result of a nearest-neighbor query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    /// Cosine similarity in [-1, 1]; higher is better.
    pub score: f32,
}

/// Optional query restriction to named documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub document_ids: Vec<String>,
}

impl DocumentFilter {
    pub fn documents<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            document_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, document_id: &str) -> bool {
        self.document_ids.iter().any(|id| id == document_id)
    }
}

/// Abstract vector index.
///
/// Insert and delete are atomic with respect to a single document: a
/// concurrent query sees either all of a document's chunks or none of them.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert (or replace) all chunks of one document.
    ///
    /// The signature is pinned on first insert; later inserts under a
    /// different `model_id` fail with [`RagError::IndexVersionMismatch`],
    /// and vectors whose length differs from the pinned dimensionality
    /// fail with [`RagError::DimensionMismatch`].
    async fn insert_document(
        &self,
        document_id: &str,
        chunks: Vec<(ChunkRecord, Vec<f32>)>,
        signature: &IndexSignature,
    ) -> Result<(), RagError>;

    /// Remove every chunk of the document. Returns the number removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError>;

    /// Nearest-neighbor search, ranked by non-increasing cosine score with
    /// ties broken by insertion order. `top_k` must be at least 1.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<SearchHit>, RagError>;

    /// The pinned signature, if any insert has happened.
    async fn signature(&self) -> Result<Option<IndexSignature>, RagError>;

    /// Total chunks stored.
    async fn count(&self) -> Result<usize, RagError>;

    /// Drop all vectors and re-pin the signature. The recovery path after
    /// an embedding model change invalidates the index.
    async fn reindex(&self, signature: &IndexSignature) -> Result<(), RagError>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Reject a write or query whose signature disagrees with the pinned one.
pub(crate) fn check_signature(
    pinned: Option<&IndexSignature>,
    incoming: &IndexSignature,
) -> Result<(), RagError> {
    if let Some(pinned) = pinned {
        if pinned.model_id != incoming.model_id {
            return Err(RagError::IndexVersionMismatch {
                indexed: pinned.model_id.clone(),
                current: incoming.model_id.clone(),
            });
        }
        if pinned.dimensions != incoming.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: pinned.dimensions,
                actual: incoming.dimensions,
            });
        }
    }
    Ok(())
}

/// Validate each vector of an insert batch against the signature.
pub(crate) fn check_vectors(
    chunks: &[(ChunkRecord, Vec<f32>)],
    signature: &IndexSignature,
) -> Result<(), RagError> {
    for (_, vector) in chunks {
        if vector.len() != signature.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: signature.dimensions,
                actual: vector.len(),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_top_k(top_k: usize) -> Result<(), RagError> {
    if top_k == 0 {
        return Err(RagError::InvalidConfig(
            "query top_k must be at least 1".to_string(),
        ));
    }
    Ok(())
}
