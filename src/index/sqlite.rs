//! SQLite-backed [`VectorIndex`].
//!
//! Chunk metadata and embedding blobs live in one table; the embedding
//! signature is pinned in `index_meta` at first insert. Per-document
//! atomicity comes from wrapping the replace-then-insert in a transaction,
//! so concurrent readers see a document's chunks all-or-nothing.
//! Search is brute-force cosine over the candidate rows.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::RagError;

use super::{
    check_signature, check_top_k, check_vectors, cosine_similarity, ChunkRecord, DocumentFilter,
    IndexSignature, SearchHit, VectorIndex,
};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::storage)?;

        let index = Self { pool };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(())
    }

    async fn load_signature<'e, E>(executor: E) -> Result<Option<IndexSignature>, RagError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let rows = sqlx::query(
            "SELECT key, value FROM index_meta WHERE key IN ('model_id', 'dimensions')",
        )
        .fetch_all(executor)
        .await
        .map_err(RagError::storage)?;

        let mut model_id = None;
        let mut dimensions = None;
        for row in rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "model_id" => model_id = Some(value),
                "dimensions" => dimensions = value.parse::<usize>().ok(),
                _ => {}
            }
        }

        Ok(match (model_id, dimensions) {
            (Some(model_id), Some(dimensions)) => Some(IndexSignature {
                model_id,
                dimensions,
            }),
            _ => None,
        })
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
        ChunkRecord {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            chunk_index: row.get::<i64, _>("chunk_index") as usize,
            text: row.get("text"),
            start_offset: row.get::<i64, _>("start_offset") as usize,
            end_offset: row.get::<i64, _>("end_offset") as usize,
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn insert_document(
        &self,
        document_id: &str,
        chunks: Vec<(ChunkRecord, Vec<f32>)>,
        signature: &IndexSignature,
    ) -> Result<(), RagError> {
        check_vectors(&chunks, signature)?;

        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        let pinned = Self::load_signature(&mut *tx).await?;
        check_signature(pinned.as_ref(), signature)?;
        if pinned.is_none() {
            sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES ('model_id', ?1)")
                .bind(&signature.model_id)
                .execute(&mut *tx)
                .await
                .map_err(RagError::storage)?;
            sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimensions', ?1)")
                .bind(signature.dimensions.to_string())
                .execute(&mut *tx)
                .await
                .map_err(RagError::storage)?;
        }

        sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;

        for (record, embedding) in &chunks {
            let blob = Self::serialize_embedding(embedding);
            sqlx::query(
                "INSERT INTO chunks (chunk_id, document_id, chunk_index, text, start_offset, end_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&record.chunk_id)
            .bind(&record.document_id)
            .bind(record.chunk_index as i64)
            .bind(&record.text)
            .bind(record.start_offset as i64)
            .bind(record.end_offset as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;
        }

        tx.commit().await.map_err(RagError::storage)?;
        tracing::debug!("indexed {} chunk(s) for document {document_id}", chunks.len());
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;

        Ok(result.rows_affected() as usize)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<SearchHit>, RagError> {
        check_top_k(top_k)?;

        let Some(signature) = Self::load_signature(&self.pool).await? else {
            return Ok(Vec::new());
        };
        if vector.len() != signature.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: signature.dimensions,
                actual: vector.len(),
            });
        }

        let rows = match filter {
            Some(filter) if !filter.document_ids.is_empty() => {
                let placeholders = (1..=filter.document_ids.len())
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT seq, chunk_id, document_id, chunk_index, text, start_offset, end_offset, embedding
                     FROM chunks WHERE document_id IN ({placeholders})"
                );
                let mut query = sqlx::query(&sql);
                for id in &filter.document_ids {
                    query = query.bind(id);
                }
                query.fetch_all(&self.pool).await.map_err(RagError::storage)?
            }
            _ => sqlx::query(
                "SELECT seq, chunk_id, document_id, chunk_index, text, start_offset, end_offset, embedding
                 FROM chunks",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::storage)?,
        };

        let mut scored: Vec<(f32, i64, ChunkRecord)> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(vector, &stored);
                (score, row.get::<i64, _>("seq"), Self::row_to_record(row))
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
        Self::load_signature(&self.pool).await
    }

    async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(count as usize)
    }

    async fn reindex(&self, signature: &IndexSignature) -> Result<(), RagError> {
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;
        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES ('model_id', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(&signature.model_id)
        .execute(&mut *tx)
        .await
        .map_err(RagError::storage)?;
        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES ('dimensions', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(signature.dimensions.to_string())
        .execute(&mut *tx)
        .await
        .map_err(RagError::storage)?;

        tx.commit().await.map_err(RagError::storage)?;
        tracing::info!("index cleared, re-pinned to {}", signature.model_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_index() -> SqliteVectorIndex {
        let tmp = std::env::temp_dir().join(format!("ragkit-index-test-{}.db", uuid::Uuid::new_v4()));
        SqliteVectorIndex::with_path(tmp).await.unwrap()
    }

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
            start_offset: idx * 50,
            end_offset: idx * 50 + text.len(),
        }
    }

    #[tokio::test]
    async fn insert_and_query() {
        let index = test_index().await;
        index
            .insert_document(
                "d1",
                vec![
                    (chunk("d1", 0, "Hello world"), vec![1.0, 0.0, 0.0]),
                    (chunk("d1", 1, "Other text"), vec![0.0, 1.0, 0.0]),
                ],
                &sig(),
            )
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
        let hits = index.query(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "d1#0");
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn signature_pinned_at_first_insert() {
        let index = test_index().await;
        assert!(index.signature().await.unwrap().is_none());

        index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();
        assert_eq!(index.signature().await.unwrap().unwrap(), sig());

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
    async fn vector_dimension_checked_on_insert() {
        let index = test_index().await;
        let result = index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0])], &sig())
            .await;
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn delete_removes_every_chunk_of_document() {
        let index = test_index().await;
        index
            .insert_document(
                "d1",
                vec![
                    (chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0]),
                    (chunk("d1", 1, "b"), vec![0.9, 0.1, 0.0]),
                ],
                &sig(),
            )
            .await
            .unwrap();
        index
            .insert_document("d2", vec![(chunk("d2", 0, "c"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();

        assert_eq!(index.delete_document("d1").await.unwrap(), 2);
        let hits = index.query(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        assert!(hits.iter().all(|h| h.chunk.document_id != "d1"));
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn filtered_query() {
        let index = test_index().await;
        index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();
        index
            .insert_document("d2", vec![(chunk("d2", 0, "b"), vec![1.0, 0.0, 0.0])], &sig())
            .await
            .unwrap();

        let filter = DocumentFilter::documents(["d1"]);
        let hits = index.query(&[1.0, 0.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.document_id, "d1");
    }

    #[tokio::test]
    async fn scores_rank_non_increasing_with_stable_ties() {
        let index = test_index().await;
        index
            .insert_document(
                "d1",
                vec![
                    (chunk("d1", 0, "tie one"), vec![1.0, 0.0, 0.0]),
                    (chunk("d1", 1, "tie two"), vec![1.0, 0.0, 0.0]),
                    (chunk("d1", 2, "off axis"), vec![0.2, 0.8, 0.0]),
                ],
                &sig(),
            )
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(hits[0].chunk.chunk_id, "d1#0");
        assert_eq!(hits[1].chunk.chunk_id, "d1#1");
    }

    #[tokio::test]
    async fn persistence_reload() {
        let tmp = std::env::temp_dir().join(format!(
            "ragkit-index-persist-test-{}.db",
            uuid::Uuid::new_v4()
        ));

        {
            let index = SqliteVectorIndex::with_path(tmp.clone()).await.unwrap();
            index
                .insert_document("d1", vec![(chunk("d1", 0, "kept"), vec![0.1, 0.2, 0.3])], &sig())
                .await
                .unwrap();
        }

        let reloaded = SqliteVectorIndex::with_path(tmp).await.unwrap();
        assert_eq!(reloaded.count().await.unwrap(), 1);
        assert_eq!(reloaded.signature().await.unwrap().unwrap(), sig());
    }

    #[tokio::test]
    async fn reindex_clears_and_repins() {
        let index = test_index().await;
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

        index
            .insert_document("d1", vec![(chunk("d1", 0, "a"), vec![1.0, 0.0, 0.0, 0.0])], &v2)
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }
}
