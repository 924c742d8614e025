//! Ingestion pipeline: load, chunk, embed, index.
//!
//! Each document moves through `pending → indexed` or `pending → failed`;
//! transitions are reported to a [`StatusSink`] owned by the surrounding
//! infrastructure (document metadata storage is not this engine's concern).
//! Batch ingestion isolates failures per document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunker;
use crate::core::config::{ChunkingConfig, GenerationConfig};
use crate::core::errors::RagError;
use crate::core::retry::with_backoff;
use crate::embedding::EmbeddingProvider;
use crate::index::{ChunkRecord, IndexSignature, VectorIndex};
use crate::loader::{self, DocumentFormat, LoadedDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Pending,
    Indexed,
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Pending => "pending",
            IngestStatus::Indexed => "indexed",
            IngestStatus::Failed => "failed",
        }
    }
}

/// Receiver for per-document status transitions.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, document_id: &str, status: IngestStatus, detail: Option<&str>);
}

/// Default sink: log the transition and nothing else.
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn report(&self, document_id: &str, status: IngestStatus, detail: Option<&str>) {
        match detail {
            Some(detail) => {
                tracing::info!("document {document_id}: {} ({detail})", status.as_str())
            }
            None => tracing::info!("document {document_id}: {}", status.as_str()),
        }
    }
}

/// One raw document in a batch ingest.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub document_id: String,
    pub source: String,
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub source: String,
    pub chunk_count: usize,
    pub created_at: String,
}

pub struct IngestPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    retry: GenerationConfig,
    sink: Arc<dyn StatusSink>,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
        retry: GenerationConfig,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            embedder,
            index,
            chunking,
            retry,
            sink,
        }
    }

    /// Ingest raw bytes in the declared format.
    pub async fn ingest_bytes(
        &self,
        document_id: &str,
        source: &str,
        format: DocumentFormat,
        bytes: &[u8],
    ) -> Result<IngestReport, RagError> {
        self.sink
            .report(document_id, IngestStatus::Pending, None)
            .await;

        let loaded = match loader::load_bytes(bytes, source, format) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.sink
                    .report(document_id, IngestStatus::Failed, Some(&e.to_string()))
                    .await;
                return Err(e);
            }
        };

        match self.index_document(document_id, &loaded).await {
            Ok(report) => {
                self.sink
                    .report(document_id, IngestStatus::Indexed, None)
                    .await;
                Ok(report)
            }
            Err(e) => {
                self.sink
                    .report(document_id, IngestStatus::Failed, Some(&e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Ingest already-plain text (e.g. pasted content).
    pub async fn ingest_text(
        &self,
        document_id: &str,
        source: &str,
        text: &str,
    ) -> Result<IngestReport, RagError> {
        self.ingest_bytes(document_id, source, DocumentFormat::Text, text.as_bytes())
            .await
    }

    /// Ingest a batch; one bad document does not fail the others.
    pub async fn ingest_batch(
        &self,
        documents: Vec<DocumentSource>,
    ) -> Vec<(String, Result<IngestReport, RagError>)> {
        let mut results = Vec::with_capacity(documents.len());
        for doc in documents {
            let result = self
                .ingest_bytes(&doc.document_id, &doc.source, doc.format, &doc.bytes)
                .await;
            if let Err(e) = &result {
                tracing::warn!("ingest of {} failed: {e}", doc.document_id);
            }
            results.push((doc.document_id, result));
        }
        results
    }

    /// Remove a document and all its chunks from the index.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize, RagError> {
        let removed = self.index.delete_document(document_id).await?;
        tracing::info!("deleted document {document_id} ({removed} chunk(s))");
        Ok(removed)
    }

    async fn index_document(
        &self,
        document_id: &str,
        loaded: &LoadedDocument,
    ) -> Result<IngestReport, RagError> {
        let chunks = chunker::split(&loaded.text, &self.chunking)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = with_backoff(
            "chunk embedding",
            self.retry.max_retries,
            Duration::from_millis(self.retry.retry_backoff_ms),
            || self.embedder.embed_batch(&texts),
        )
        .await?;

        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<(ChunkRecord, Vec<f32>)> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                (
                    ChunkRecord {
                        chunk_id: ChunkRecord::id_for(document_id, chunk.chunk_index),
                        document_id: document_id.to_string(),
                        chunk_index: chunk.chunk_index,
                        text: chunk.text.clone(),
                        start_offset: chunk.start_offset,
                        end_offset: chunk.end_offset,
                    },
                    vector,
                )
            })
            .collect();

        let signature = IndexSignature {
            model_id: self.embedder.model_id().to_string(),
            dimensions: self.embedder.dimensions(),
        };
        let chunk_count = records.len();
        self.index
            .insert_document(document_id, records, &signature)
            .await?;

        tracing::debug!(
            "ingested {} as {}: {chunk_count} chunk(s)",
            document_id,
            loaded.format
        );

        Ok(IngestReport {
            document_id: document_id.to_string(),
            source: loaded.source.clone(),
            chunk_count,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}
