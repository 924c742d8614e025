//! Query-side retrieval: embed, search, re-rank.
//!
//! The re-rank pass is deliberately simple: drop hits under the relevance
//! threshold, cap hits per document so one document cannot monopolize the
//! grounding set, and drop near-identical chunk texts (overlapping chunks
//! from the same neighborhood often tie). An empty result is a valid
//! outcome, not an error; callers decide what "no grounding" means.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::core::config::{GenerationConfig, RetrievalConfig};
use crate::core::errors::RagError;
use crate::core::retry::with_backoff;
use crate::embedding::EmbeddingProvider;
use crate::index::{DocumentFilter, IndexSignature, SearchHit, VectorIndex};

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
    retry: GenerationConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
        retry: GenerationConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve grounding chunks for a query.
    ///
    /// Returns an empty vector when the index has no content, or nothing
    /// scores above the relevance threshold.
    pub async fn retrieve(
        &self,
        query_text: &str,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<SearchHit>, RagError> {
        let Some(pinned) = self.index.signature().await? else {
            // nothing indexed yet
            return Ok(Vec::new());
        };
        let current = IndexSignature {
            model_id: self.embedder.model_id().to_string(),
            dimensions: self.embedder.dimensions(),
        };
        if pinned.model_id != current.model_id {
            return Err(RagError::IndexVersionMismatch {
                indexed: pinned.model_id,
                current: current.model_id,
            });
        }

        let query_vector = with_backoff(
            "query embedding",
            self.retry.max_retries,
            Duration::from_millis(self.retry.retry_backoff_ms),
            || self.embedder.embed(query_text),
        )
        .await?;

        let oversampled = self.config.top_k * self.config.oversample;
        let candidates = self
            .index
            .query(&query_vector, oversampled.max(1), filter)
            .await?;

        Ok(self.rerank(candidates))
    }

    /// Threshold, per-document cap and content-hash dedup, preserving rank
    /// order throughout.
    fn rerank(&self, candidates: Vec<SearchHit>) -> Vec<SearchHit> {
        let mut per_document: HashMap<String, usize> = HashMap::new();
        let mut seen_texts: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(self.config.top_k);

        for hit in candidates {
            if kept.len() == self.config.top_k {
                break;
            }
            if hit.score < self.config.min_score {
                // candidates are ranked, everything after is below threshold
                break;
            }

            let text_hash = hex::encode(Sha256::digest(hit.chunk.text.trim().as_bytes()));
            if !seen_texts.insert(text_hash) {
                tracing::debug!("dropping duplicate chunk {}", hit.chunk.chunk_id);
                continue;
            }

            let doc_hits = per_document
                .entry(hit.chunk.document_id.clone())
                .or_insert(0);
            if *doc_hits >= self.config.max_per_document {
                continue;
            }
            *doc_hits += 1;

            kept.push(hit);
        }

        kept
    }
}
