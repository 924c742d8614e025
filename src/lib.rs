//! ragkit — a Retrieval-Augmented Generation engine.
//!
//! The pipeline: documents are loaded into plain text ([`loader`]), split
//! into overlapping chunks ([`chunker`]), embedded ([`embedding`]) and
//! stored in a vector index ([`index`]). At query time the [`retriever`]
//! ranks grounding chunks and the [`orchestrator`] produces a cited answer
//! while the [`history`] store tracks per-session conversation turns.
//! [`engine::RagEngine`] wires the pieces together behind injectable
//! handles; the HTTP layer, document metadata storage and authentication
//! are the caller's concern.

pub mod chunker;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod history;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;

pub use crate::core::config::RagConfig;
pub use crate::core::errors::RagError;
pub use crate::embedding::EmbeddingProvider;
pub use crate::engine::{RagEngine, RagEngineBuilder};
pub use crate::history::{ConversationStore, Role, Turn};
pub use crate::index::{ChunkRecord, DocumentFilter, IndexSignature, SearchHit, VectorIndex};
pub use crate::ingest::{DocumentSource, IngestReport, IngestStatus, StatusSink};
pub use crate::llm::GenerativeModel;
pub use crate::loader::DocumentFormat;
pub use crate::orchestrator::{ChatAnswer, Citation};
