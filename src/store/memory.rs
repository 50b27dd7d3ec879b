//! In-memory store implementations for testing and embedded use.
//!
//! [`MemoryStore`] implements all three storage traits behind
//! `std::sync::RwLock`. Vector search is brute-force cosine similarity over
//! all stored vectors. No lock is held across an await point.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ConversationTurn, Document, ScopeFilter};
use crate::questions::QuestionSet;

use super::{CacheEntry, CacheStore, DeleteFilter, DocumentStore, IndexMatch, VectorEntry, VectorIndex};

/// In-memory backend for tests and embedding-free demos.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Document>>,
    chunks: RwLock<HashMap<String, Vec<Chunk>>>,
    vectors: RwLock<Vec<VectorEntry>>,
    turns: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    question_sets: RwLock<HashMap<String, QuestionSet>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryStore {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        for entry in entries {
            vectors.retain(|e| e.chunk_id != entry.chunk_id);
            vectors.push(entry);
        }
        Ok(())
    }

    async fn delete(&self, filter: &DeleteFilter) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        match filter {
            DeleteFilter::Document(id) => vectors.retain(|e| &e.metadata.document_id != id),
            DeleteFilter::Notebook(id) => vectors.retain(|e| &e.metadata.notebook_id != id),
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let vectors = self.vectors.read().unwrap();
        let mut matches: Vec<IndexMatch> = vectors
            .iter()
            .filter(|e| scope.matches(&e.metadata))
            .map(|e| IndexMatch {
                chunk_id: e.chunk_id.clone(),
                score: cosine_similarity(vector, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put_document(&self, doc: &Document) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(id).cloned())
    }

    async fn list_documents(&self, notebook_id: &str) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .documents
            .read()
            .unwrap()
            .values()
            .filter(|d| d.notebook_id == notebook_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn count_documents(&self, scope: &ScopeFilter) -> Result<u64> {
        let docs = self.documents.read().unwrap();
        let count = docs
            .values()
            .filter(|d| d.notebook_id == scope.notebook_id)
            .filter(|d| match &scope.document_ids {
                Some(ids) => ids.iter().any(|id| id == &d.id),
                None => true,
            })
            .count();
        Ok(count as u64)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.documents.write().unwrap().remove(id);
        self.chunks.write().unwrap().remove(id);
        Ok(())
    }

    async fn put_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        self.chunks
            .write()
            .unwrap()
            .insert(document_id.to_string(), chunks.to_vec());
        Ok(())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut chunks = self
            .chunks
            .read()
            .unwrap()
            .get(document_id)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn append_turn(&self, notebook_id: &str, turn: &ConversationTurn) -> Result<()> {
        self.turns
            .write()
            .unwrap()
            .entry(notebook_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn recent_turns(
        &self,
        notebook_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let turns = self.turns.read().unwrap();
        let all = turns.get(notebook_id).cloned().unwrap_or_default();
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }

    async fn put_question_set(&self, set: &QuestionSet) -> Result<()> {
        self.question_sets
            .write()
            .unwrap()
            .insert(set.id.clone(), set.clone());
        Ok(())
    }

    async fn get_question_set(&self, id: &str) -> Result<Option<QuestionSet>> {
        Ok(self.question_sets.read().unwrap().get(id).cloned())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.cache.read().unwrap().get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.cache
            .write()
            .unwrap()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.cache
            .write()
            .unwrap()
            .retain(|_, e| e.document_id != document_id);
        Ok(())
    }

    async fn purge_expired(&self, cutoff: i64) -> Result<u64> {
        let mut cache = self.cache.write().unwrap();
        let before = cache.len();
        cache.retain(|_, e| e.created_at >= cutoff);
        Ok((before - cache.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn entry(chunk_id: &str, doc: &str, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: chunk_id.to_string(),
            vector,
            metadata: ChunkMetadata {
                notebook_id: "n1".to_string(),
                document_id: doc.to_string(),
                filename: format!("{}.txt", doc),
                page: None,
                chunk_index: 0,
                text: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_chunk_id() {
        let store = MemoryStore::new();
        store
            .upsert(vec![entry("c1", "d1", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(vec![entry("c1", "d1", vec![0.0, 1.0])])
            .await
            .unwrap();

        let matches = store
            .query(&[0.0, 1.0], &ScopeFilter::notebook("n1"), 10)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_scores_descending_and_truncated() {
        let store = MemoryStore::new();
        store
            .upsert(vec![
                entry("c1", "d1", vec![1.0, 0.0]),
                entry("c2", "d1", vec![0.7, 0.7]),
                entry("c3", "d1", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let matches = store
            .query(&[1.0, 0.0], &ScopeFilter::notebook("n1"), 2)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches[0].score >= matches[1].score);
        assert_eq!(matches[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn delete_by_document_filter() {
        let store = MemoryStore::new();
        store
            .upsert(vec![
                entry("c1", "d1", vec![1.0, 0.0]),
                entry("c2", "d2", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        store
            .delete(&DeleteFilter::Document("d1".to_string()))
            .await
            .unwrap();

        let matches = store
            .query(&[1.0, 0.0], &ScopeFilter::notebook("n1"), 10)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].chunk_id, "c2");
    }

    #[tokio::test]
    async fn recent_turns_keeps_chronological_tail() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .append_turn(
                    "n1",
                    &ConversationTurn {
                        role: crate::models::Role::User,
                        text: format!("turn {}", i),
                        citations: Vec::new(),
                        created_at: i,
                    },
                )
                .await
                .unwrap();
        }

        let turns = store.recent_turns("n1", 2).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "turn 3");
        assert_eq!(turns[1].text, "turn 4");
    }

    #[tokio::test]
    async fn purge_expired_removes_old_entries() {
        let store = MemoryStore::new();
        store
            .put(&CacheEntry {
                key: "old".to_string(),
                document_id: "d1".to_string(),
                value: "{}".to_string(),
                created_at: 100,
            })
            .await
            .unwrap();
        store
            .put(&CacheEntry {
                key: "new".to_string(),
                document_id: "d1".to_string(),
                value: "{}".to_string(),
                created_at: 200,
            })
            .await
            .unwrap();

        let purged = store.purge_expired(150).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }
}
