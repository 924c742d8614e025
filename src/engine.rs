//! Engine facade: owned, injectable handles and concurrency discipline.
//!
//! The engine holds `Arc<dyn …>` handles for the index, embedder, model,
//! conversation store and status sink (nothing global, nothing singleton)
//! and enforces the two serialization rules: calls within one session run
//! in order, and ingest/delete for one document id never overlap. Work for
//! different sessions and documents proceeds concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::embedding::EmbeddingProvider;
use crate::history::{ConversationStore, Turn};
use crate::index::{DocumentFilter, IndexSignature, SearchHit, VectorIndex};
use crate::ingest::{DocumentSource, IngestPipeline, IngestReport, LogStatusSink, StatusSink};
use crate::llm::GenerativeModel;
use crate::loader::DocumentFormat;
use crate::orchestrator::{ChatAnswer, Orchestrator};
use crate::retriever::Retriever;

type KeyedLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

pub struct RagEngine {
    config: RagConfig,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    history: Arc<dyn ConversationStore>,
    ingest: IngestPipeline,
    retriever: Retriever,
    orchestrator: Orchestrator,
    session_locks: KeyedLocks,
    document_locks: KeyedLocks,
}

impl RagEngine {
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Fresh session id for callers that do not bring their own.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Ingest raw bytes as one document. Replaces any earlier content
    /// indexed under the same id; serialized per document id.
    pub async fn ingest_document(
        &self,
        document_id: &str,
        source: &str,
        format: DocumentFormat,
        bytes: &[u8],
    ) -> Result<IngestReport, RagError> {
        let lock = keyed_lock(&self.document_locks, document_id);
        let _guard = lock.lock().await;
        self.ingest
            .ingest_bytes(document_id, source, format, bytes)
            .await
    }

    /// Ingest plain text as one document.
    pub async fn ingest_text(
        &self,
        document_id: &str,
        source: &str,
        text: &str,
    ) -> Result<IngestReport, RagError> {
        let lock = keyed_lock(&self.document_locks, document_id);
        let _guard = lock.lock().await;
        self.ingest.ingest_text(document_id, source, text).await
    }

    /// Ingest several documents; failures are isolated per document.
    pub async fn ingest_batch(
        &self,
        documents: Vec<DocumentSource>,
    ) -> Vec<(String, Result<IngestReport, RagError>)> {
        let mut results = Vec::with_capacity(documents.len());
        for doc in documents {
            let result = self
                .ingest_document(&doc.document_id, &doc.source, doc.format, &doc.bytes)
                .await;
            results.push((doc.document_id, result));
        }
        results
    }

    /// Remove a document and all its chunks.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize, RagError> {
        let lock = keyed_lock(&self.document_locks, document_id);
        let _guard = lock.lock().await;
        self.ingest.delete_document(document_id).await
    }

    /// Retrieve grounding chunks for a query without generating an answer.
    pub async fn retrieve(
        &self,
        query_text: &str,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<SearchHit>, RagError> {
        self.retriever.retrieve(query_text, filter).await
    }

    /// Answer a user message within a session. Calls for the same session
    /// are serialized so turns land in request order.
    pub async fn answer(
        &self,
        session_id: &str,
        user_message: &str,
    ) -> Result<ChatAnswer, RagError> {
        let lock = keyed_lock(&self.session_locks, session_id);
        let _guard = lock.lock().await;
        self.orchestrator.answer(session_id, user_message).await
    }

    /// The most recent `max_turns` turns of a session (`0` = all).
    pub async fn history(
        &self,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<Turn>, RagError> {
        self.history.history(session_id, max_turns).await
    }

    /// Delete a session and its turns.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, RagError> {
        let lock = keyed_lock(&self.session_locks, session_id);
        let _guard = lock.lock().await;
        self.history.delete_session(session_id).await
    }

    /// Clear the index and re-pin it to the current embedder. Required
    /// after swapping the embedding provider; all documents must be
    /// re-ingested afterwards.
    pub async fn reindex(&self) -> Result<(), RagError> {
        let signature = IndexSignature {
            model_id: self.embedder.model_id().to_string(),
            dimensions: self.embedder.dimensions(),
        };
        self.index.reindex(&signature).await
    }
}

fn keyed_lock(locks: &KeyedLocks, key: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut map = locks.lock().unwrap_or_else(|e| e.into_inner());
    map.entry(key.to_string())
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
        .clone()
}

#[derive(Default)]
pub struct RagEngineBuilder {
    config: RagConfig,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    model: Option<Arc<dyn GenerativeModel>>,
    history: Option<Arc<dyn ConversationStore>>,
    status_sink: Option<Arc<dyn StatusSink>>,
}

impl RagEngineBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = config;
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn history(mut self, history: Arc<dyn ConversationStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<RagEngine, RagError> {
        self.config.validate()?;

        let index = self
            .index
            .ok_or_else(|| RagError::InvalidConfig("engine requires a vector index".into()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::InvalidConfig("engine requires an embedding provider".into()))?;
        let model = self
            .model
            .ok_or_else(|| RagError::InvalidConfig("engine requires a generative model".into()))?;
        let history = self
            .history
            .ok_or_else(|| RagError::InvalidConfig("engine requires a conversation store".into()))?;
        let status_sink = self.status_sink.unwrap_or_else(|| Arc::new(LogStatusSink));

        let ingest = IngestPipeline::new(
            embedder.clone(),
            index.clone(),
            self.config.chunking.clone(),
            self.config.generation.clone(),
            status_sink,
        );
        let retriever = Retriever::new(
            embedder.clone(),
            index.clone(),
            self.config.retrieval.clone(),
            self.config.generation.clone(),
        );
        let orchestrator = Orchestrator::new(
            model,
            Retriever::new(
                embedder.clone(),
                index.clone(),
                self.config.retrieval.clone(),
                self.config.generation.clone(),
            ),
            history.clone(),
            self.config.prompt.clone(),
            self.config.generation.clone(),
        );

        Ok(RagEngine {
            config: self.config,
            index,
            embedder,
            history,
            ingest,
            retriever,
            orchestrator,
            session_locks: Mutex::new(HashMap::new()),
            document_locks: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::history::{InMemoryConversationStore, Role};
    use crate::index::InMemoryIndex;
    use crate::llm::ChatRequest;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model_id(&self) -> &str {
            "length-test"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            Ok(vec![1.0, text.len() as f32])
        }
    }

    /// Model that sleeps briefly so overlapping calls can interleave if
    /// session serialization is broken.
    struct SlowEcho;

    #[async_trait]
    impl GenerativeModel for SlowEcho {
        fn name(&self) -> &str {
            "slow-echo"
        }

        async fn complete(&self, request: ChatRequest) -> Result<String, RagError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let last = request.messages.last().cloned();
            Ok(format!("echo: {}", last.map(|m| m.content).unwrap_or_default()))
        }
    }

    fn engine() -> Arc<RagEngine> {
        Arc::new(
            RagEngine::builder()
                .index(Arc::new(InMemoryIndex::new()))
                .embedder(Arc::new(LengthEmbedder))
                .model(Arc::new(SlowEcho))
                .history(Arc::new(InMemoryConversationStore::new()))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn builder_requires_all_handles() {
        let result = RagEngine::builder()
            .index(Arc::new(InMemoryIndex::new()))
            .build();
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn ingest_then_answer_end_to_end() {
        let engine = engine();
        engine
            .ingest_text("doc-1", "notes.txt", "The office cat is named Miso.")
            .await
            .unwrap();

        let answer = engine.answer("s1", "What is the cat called?").await.unwrap();
        assert!(answer.answer.starts_with("echo:"));

        let turns = engine.history("s1", 0).await.unwrap();
        assert_eq!(turns.len(), 2);
    }

    #[tokio::test]
    async fn same_session_calls_are_serialized() {
        let engine = engine();

        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.answer("s1", "first message").await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.answer("s1", "second message").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let turns = engine.history("s1", 0).await.unwrap();
        assert_eq!(turns.len(), 4);
        let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        // each user turn is immediately followed by its own echo
        assert_eq!(turns[1].content, format!("echo: {}", turns[0].content));
        assert_eq!(turns[3].content, format!("echo: {}", turns[2].content));
    }

    #[tokio::test]
    async fn different_sessions_do_not_block_each_other() {
        let engine = engine();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .answer(&format!("session-{i}"), &format!("hello {i}"))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        for i in 0..4 {
            assert_eq!(engine.history(&format!("session-{i}"), 0).await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn delete_session_clears_state() {
        let engine = engine();
        engine.answer("s1", "hello").await.unwrap();

        assert!(engine.delete_session("s1").await.unwrap());
        assert!(engine.history("s1", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reindex_repins_to_current_embedder() {
        let engine = engine();
        engine.ingest_text("d1", "a.txt", "content here").await.unwrap();

        engine.reindex().await.unwrap();
        let hits = engine.retrieve("content", None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(RagEngine::new_session_id(), RagEngine::new_session_id());
    }
}
