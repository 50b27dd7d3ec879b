//! Storage abstractions for Lectern.
//!
//! The pipeline consumes three narrow trait interfaces, enabling pluggable
//! backends (SQLite, in-memory, hosted services):
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`VectorIndex`] | Embedding vectors with metadata; top-k similarity query |
//! | [`DocumentStore`] | Documents, chunks, conversation turns, question sets |
//! | [`CacheStore`] | Raw analysis-cache entries (TTL applied by the cache layer) |
//!
//! Trait methods return `anyhow::Result`; components translate failures
//! into the caller-visible [`crate::error::Error`] kinds at their boundary.
//! Implementations must be `Send + Sync` and safe under concurrent access.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ChunkMetadata, ConversationTurn, Document, ScopeFilter};
use crate::questions::QuestionSet;

/// A vector plus its citation-bearing metadata, as stored in the index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A raw match returned by [`VectorIndex::query`], unordered guarantees
/// beyond descending score; the retriever applies final ordering rules.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub chunk_id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Filter for bulk deletion from the vector index.
#[derive(Debug, Clone)]
pub enum DeleteFilter {
    Document(String),
    Notebook(String),
}

/// Vector store interface: upsert, delete-by-filter, top-k similarity query.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace entries by chunk id.
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()>;

    /// Delete all entries matching the filter.
    async fn delete(&self, filter: &DeleteFilter) -> Result<()>;

    /// Return up to `k` entries most similar to `vector`, restricted to
    /// `scope`, in descending score order.
    async fn query(&self, vector: &[f32], scope: &ScopeFilter, k: usize)
        -> Result<Vec<IndexMatch>>;
}

/// Keyed persistence for documents and their derived records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn list_documents(&self, notebook_id: &str) -> Result<Vec<Document>>;

    /// Number of documents inside the scope. Used by the retriever to
    /// distinguish an empty scope from a scope with no matches.
    async fn count_documents(&self, scope: &ScopeFilter) -> Result<u64>;

    /// Delete a document and its chunks.
    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Replace all chunks for a document.
    async fn put_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// All chunks for a document, ordered by `chunk_index`.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Append one turn to a notebook's conversation.
    async fn append_turn(&self, notebook_id: &str, turn: &ConversationTurn) -> Result<()>;

    /// The most recent `limit` turns, in chronological order.
    async fn recent_turns(&self, notebook_id: &str, limit: usize)
        -> Result<Vec<ConversationTurn>>;

    async fn put_question_set(&self, set: &QuestionSet) -> Result<()>;

    async fn get_question_set(&self, id: &str) -> Result<Option<QuestionSet>>;
}

/// A raw analysis-cache row. Logical TTL is applied by
/// [`crate::cache::AnalysisCache`] at read time; stores only persist.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Content-addressed key (hex digest).
    pub key: String,
    /// Parent document, for cascade deletion.
    pub document_id: String,
    /// Serialized analysis result.
    pub value: String,
    /// Unix seconds at write time.
    pub created_at: i64,
}

/// Raw cache persistence. Last writer wins on key collisions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove all entries belonging to a document.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Physically remove entries created before `cutoff`. Optional
    /// housekeeping — logical expiry never depends on it running.
    async fn purge_expired(&self, cutoff: i64) -> Result<u64>;
}
