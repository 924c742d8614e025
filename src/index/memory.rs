//! In-memory [`VectorIndex`] for tests and ephemeral corpora.
//!
//! Brute-force cosine search over a `RwLock`-guarded row list. Per-document
//! atomicity falls out of the write lock: a query never observes a document
//! mid-insert or mid-delete.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::core::errors::RagError;

use super::{
    check_signature, check_top_k, check_vectors, cosine_similarity, ChunkRecord, DocumentFilter,
    IndexSignature, SearchHit, VectorIndex,
};

struct StoredRow {
    record: ChunkRecord,
    vector: Vec<f32>,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    signature: Option<IndexSignature>,
    next_seq: u64,
    rows: Vec<StoredRow>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert_document(
        &self,
        document_id: &str,
        chunks: Vec<(ChunkRecord, Vec<f32>)>,
        signature: &IndexSignature,
    ) -> Result<(), RagError> {
        check_vectors(&chunks, signature)?;

        let mut inner = self.lock_write();
        check_signature(inner.signature.as_ref(), signature)?;
        if inner.signature.is_none() {
            inner.signature = Some(signature.clone());
        }

        inner.rows.retain(|row| row.record.document_id != document_id);
        for (record, vector) in chunks {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.rows.push(StoredRow {
                record,
                vector,
                seq,
            });
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError> {
        let mut inner = self.lock_write();
        let before = inner.rows.len();
        inner.rows.retain(|row| row.record.document_id != document_id);
        Ok(before - inner.rows.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<SearchHit>, RagError> {
        check_top_k(top_k)?;

        let inner = self.lock_read();
        let Some(signature) = inner.signature.as_ref() else {
            return Ok(Vec::new());
        };
        if vector.len() != signature.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: signature.dimensions,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(f32, u64, ChunkRecord)> = inner
            .rows
            .iter()
            .filter(|row| {
                filter
                    .map(|f| f.matches(&row.record.document_id))
                    .unwrap_or(true)
            })
            .map(|row| {
                (
                    cosine_similarity(vector, &row.vector),
                    row.seq,
                    row.record.clone(),
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, _, chunk)| SearchHit { chunk, score })
            .collect())
    }

    async fn signature(&self) -> Result<Option<IndexSignature>, RagError> {
        Ok(self.lock_read().signature.clone())
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.lock_read().rows.len())
    }

    async fn reindex(&self, signature: &IndexSignature) -> Result<(), RagError> {
        let mut inner = self.lock_write();
        inner.rows.clear();
        inner.signature = Some(signature.clone());
        tracing::info!("in-memory index cleared, re-pinned to {}", signature.model_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sig() -> IndexSignature {
        IndexSignature {
            model_id: "embed-v1".into(),
            dimensions: 3,
        }
    }

    fn chunk(doc: &str, idx: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: ChunkRecord::id_for(doc, idx),
            document_id: doc.to_string(),
            chunk_index: idx,
            text: text.to_string(),
            start_offset: idx * 100,
            end_offset: idx * 100 + text.len(),
        }
    }

    #[tokio::test]
    async fn insert_query_delete_roundtrip() {
        let index = InMemoryIndex::new();
        index
            .insert_document(
                "d1",
                vec![
                    (chunk("d1", 0, "alpha"), vec![1.0, 0.0, 0.0]),
                    (chunk("d1", 1, "beta"), vec![0.0, 1.0, 0.0]),
                ],
                &sig(),
            )
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "d1#0");
        assert!(hits[0].score > hits[1].score);

        let removed = index.delete_document("d1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(index.query(&[1.0, 0.0, 0.0], 2, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reinsert_replaces_previous_chunks() {
        let index = InMemoryIndex::new();
        index
            .insert_document("d1", vec![(chunk("d1", 0, "old"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();
        index
            .insert_document(
                "d1",
                vec![
                    (chunk("d1", 0, "new"), vec![1.0, 0.0, 0.0]),
                    (chunk("d1", 1, "more"), vec![0.5, 0.5, 0.0]),
                ],
                &sig(),
            )
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
        let hits = index.query(&[1.0, 0.0, 0.0], 5, None).await.unwrap();
        assert_eq!(hits[0].chunk.text, "new");
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let index = InMemoryIndex::new();
        index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();

        let other = IndexSignature {
            model_id: "embed-v2".into(),
            dimensions: 3,
        };
        let result = index
            .insert_document("d2", vec![(chunk("d2", 0, "b"), vec![1.0, 0.0, 0.0])], &other)
            .await;
        assert!(matches!(result, Err(RagError::IndexVersionMismatch { .. })));
    }

    #[tokio::test]
    async fn query_dimension_mismatch() {
        let index = InMemoryIndex::new();
        index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();

        let result = index.query(&[1.0, 0.0], 1, None).await;
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn empty_index_returns_no_hits() {
        let index = InMemoryIndex::new();
        assert!(index.query(&[1.0, 0.0, 0.0], 3, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filter_restricts_documents() {
        let index = InMemoryIndex::new();
        index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();
        index
            .insert_document("d2", vec![(chunk("d2", 0, "b"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();

        let filter = DocumentFilter::documents(["d2"]);
        let hits = index.query(&[1.0, 0.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.document_id, "d2");
    }

    #[tokio::test]
    async fn ties_break_by_insertion_order() {
        let index = InMemoryIndex::new();
        index
            .insert_document(
                "d1",
                vec![
                    (chunk("d1", 0, "first"), vec![1.0, 0.0, 0.0]),
                    (chunk("d1", 1, "second"), vec![1.0, 0.0, 0.0]),
                ],
                &sig(),
            )
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].chunk.chunk_id, "d1#0");
        assert_eq!(hits[1].chunk.chunk_id, "d1#1");
    }

    #[tokio::test]
    async fn concurrent_queries_see_all_or_nothing() {
        let index = Arc::new(InMemoryIndex::new());
        let writer = {
            let index = index.clone();
            tokio::spawn(async move {
                for round in 0..50u64 {
                    let chunks: Vec<_> = (0..5)
                        .map(|i| (chunk("doc", i, &format!("r{round} c{i}")), vec![1.0, 0.0, 0.0]))
                        .collect();
                    index.insert_document("doc", chunks, &sig()).await.unwrap();
                    index.delete_document("doc").await.unwrap();
                }
            })
        };

        let reader = {
            let index = index.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let hits = index.query(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
                    assert!(
                        hits.len() == 0 || hits.len() == 5,
                        "partial visibility: {} chunks",
                        hits.len()
                    );
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn reindex_clears_and_repins() {
        let index = InMemoryIndex::new();
        index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();

        let v2 = IndexSignature {
            model_id: "embed-v2".into(),
            dimensions: 4,
        };
        index.reindex(&v2).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert_eq!(index.signature().await.unwrap().unwrap(), v2);
    }
}
