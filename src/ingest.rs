//! Ingestion pipeline orchestration.
//!
//! Coordinates the ingestion path for one document: extracted text →
//! chunking → batched embedding → vector-index upsert + document-store
//! persistence. Independent documents may be ingested concurrently; chunk
//! ordering within a document is deterministic regardless.
//!
//! Embedding failure aborts the document's ingestion before anything is
//! written, so the store and the index never disagree about a document.

use std::sync::Arc;

use uuid::Uuid;

use crate::cache::AnalysisCache;
use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::extract::ExtractedDocument;
use crate::models::{ChunkMetadata, Document, DocumentFormat};
use crate::store::{DeleteFilter, DocumentStore, VectorEntry, VectorIndex};

/// Summary of one document's ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_id: String,
    pub chunk_count: usize,
    pub page_count: usize,
}

/// Runs the ingestion path and the cascading delete.
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<AnalysisCache>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<AnalysisCache>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            cache,
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest one extracted document into a notebook.
    pub async fn ingest(
        &self,
        notebook_id: &str,
        filename: &str,
        format: DocumentFormat,
        extracted: ExtractedDocument,
    ) -> Result<IngestOutcome> {
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            notebook_id: notebook_id.to_string(),
            filename: filename.to_string(),
            format,
            body: extracted.text,
            page_offsets: extracted.page_offsets,
            created_at: chrono::Utc::now().timestamp(),
        };

        let chunks = chunk_text(
            &doc.id,
            &doc.body,
            &doc.page_offsets,
            self.chunking.window_chars,
            self.chunking.overlap_chars,
        )?;

        // Embed before writing anything so a provider failure leaves no
        // half-ingested document behind.
        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::EmbeddingFailed(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                entries.push(VectorEntry {
                    chunk_id: chunk.id.clone(),
                    vector,
                    metadata: ChunkMetadata {
                        notebook_id: doc.notebook_id.clone(),
                        document_id: doc.id.clone(),
                        filename: doc.filename.clone(),
                        page: chunk.page,
                        chunk_index: chunk.chunk_index,
                        text: chunk.text.clone(),
                    },
                });
            }
        }

        self.store.put_document(&doc).await.map_err(Error::storage)?;
        self.store
            .put_chunks(&doc.id, &chunks)
            .await
            .map_err(Error::storage)?;
        self.index.upsert(entries).await.map_err(Error::storage)?;

        log::info!(
            "ingested {} ({} chunks, {} pages)",
            doc.filename,
            chunks.len(),
            doc.page_count()
        );

        Ok(IngestOutcome {
            document_id: doc.id,
            chunk_count: chunks.len(),
            page_count: doc.page_offsets.len(),
        })
    }

    /// Delete a document and everything derived from it: chunks, index
    /// vectors, and analysis-cache entries.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        delete_document(
            self.store.as_ref(),
            self.index.as_ref(),
            &self.cache,
            document_id,
        )
        .await
    }
}

/// Cascade deletion of a document: index vectors, cached analyses, then
/// the stored document and its chunks.
pub async fn delete_document(
    store: &dyn DocumentStore,
    index: &dyn VectorIndex,
    cache: &AnalysisCache,
    document_id: &str,
) -> Result<()> {
    index
        .delete(&DeleteFilter::Document(document_id.to_string()))
        .await
        .map_err(Error::storage)?;
    cache.invalidate_document(document_id).await?;
    store
        .delete_document(document_id)
        .await
        .map_err(Error::storage)?;
    Ok(())
}
