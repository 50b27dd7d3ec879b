//! Query-time retrieval over the vector index.
//!
//! Embeds a question with the same model used at ingestion, issues a top-k
//! similarity query restricted by a [`ScopeFilter`], and returns ranked
//! results with provenance.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{RetrievalResult, ScopeFilter};
use crate::store::{DocumentStore, VectorIndex};

/// Retrieves ranked chunks for a query.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
        }
    }

    /// Return up to `k` chunks from the scope, in strictly non-increasing
    /// score order; ties broken by lower chunk ordinal. If fewer than `k`
    /// chunks exist in scope, all of them are returned.
    ///
    /// Fails with [`Error::NoContentAvailable`] when the scope holds no
    /// documents — checked before any embedding or index call so callers
    /// can short-circuit without touching the model service.
    pub async fn retrieve(
        &self,
        query: &str,
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let doc_count = self
            .store
            .count_documents(scope)
            .await
            .map_err(Error::storage)?;
        if doc_count == 0 {
            return Err(Error::NoContentAvailable);
        }

        let query_vec = self.embedder.embed_one(query).await?;

        let mut matches = self
            .index
            .query(&query_vec, scope, k)
            .await
            .map_err(Error::storage)?;

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        matches.truncate(k);

        Ok(matches
            .into_iter()
            .enumerate()
            .map(|(rank, m)| RetrievalResult {
                chunk_id: m.chunk_id,
                metadata: m.metadata,
                score: m.score,
                rank,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, Document, DocumentFormat};
    use crate::store::memory::MemoryStore;
    use crate::store::VectorEntry;
    use async_trait::async_trait;

    /// Embedder that maps known phrases to fixed unit vectors.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("axis") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            notebook_id: "n1".to_string(),
            filename: format!("{}.txt", id),
            format: DocumentFormat::Text,
            body: String::new(),
            page_offsets: Vec::new(),
            created_at: 0,
        }
    }

    fn entry(chunk_id: &str, index: i64, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: chunk_id.to_string(),
            vector,
            metadata: ChunkMetadata {
                notebook_id: "n1".to_string(),
                document_id: "d1".to_string(),
                filename: "d1.txt".to_string(),
                page: None,
                chunk_index: index,
                text: format!("chunk {}", index),
            },
        }
    }

    async fn setup(entries: Vec<VectorEntry>) -> Retriever {
        let store = Arc::new(MemoryStore::new());
        store.put_document(&doc("d1")).await.unwrap();
        VectorIndex::upsert(store.as_ref(), entries).await.unwrap();
        Retriever::new(Arc::new(StubEmbedder), store.clone(), store)
    }

    #[tokio::test]
    async fn results_in_non_increasing_score_order() {
        let retriever = setup(vec![
            entry("d1:0", 0, vec![0.0, 1.0]),
            entry("d1:1", 1, vec![1.0, 0.0]),
            entry("d1:2", 2, vec![0.7, 0.7]),
        ])
        .await;

        let results = retriever
            .retrieve("axis question", &ScopeFilter::notebook("n1"), 5)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].chunk_id, "d1:1");
        assert_eq!(results[0].rank, 0);
        assert_eq!(results[2].rank, 2);
    }

    #[tokio::test]
    async fn never_more_than_k_results() {
        let entries = (0..10)
            .map(|i| entry(&format!("d1:{}", i), i, vec![1.0, 0.0]))
            .collect();
        let retriever = setup(entries).await;

        let results = retriever
            .retrieve("axis", &ScopeFilter::notebook("n1"), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn ties_broken_by_lower_chunk_index() {
        let retriever = setup(vec![
            entry("d1:3", 3, vec![1.0, 0.0]),
            entry("d1:1", 1, vec![1.0, 0.0]),
            entry("d1:2", 2, vec![1.0, 0.0]),
        ])
        .await;

        let results = retriever
            .retrieve("axis", &ScopeFilter::notebook("n1"), 5)
            .await
            .unwrap();
        let indices: Vec<i64> = results.iter().map(|r| r.metadata.chunk_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn fewer_than_k_returns_all() {
        let retriever = setup(vec![entry("d1:0", 0, vec![1.0, 0.0])]).await;
        let results = retriever
            .retrieve("axis", &ScopeFilter::notebook("n1"), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn empty_scope_is_no_content() {
        let store = Arc::new(MemoryStore::new());
        let retriever = Retriever::new(Arc::new(StubEmbedder), store.clone(), store);

        let err = retriever
            .retrieve("axis", &ScopeFilter::notebook("n1"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoContentAvailable));
    }
}
