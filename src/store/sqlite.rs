//! SQLite-backed store implementations.
//!
//! [`SqliteStore`] implements all three storage traits over one `sqlx`
//! pool. Vector search is brute-force cosine similarity computed in Rust
//! over the notebook's rows, with embeddings persisted as little-endian
//! f32 BLOBs. The analysis-cache table carries `created_at` for the cache
//! layer's read-time TTL and the lazy `purge_expired` sweep.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ChunkMetadata, ConversationTurn, Document, DocumentFormat, Role, ScopeFilter};
use crate::questions::QuestionSet;

use super::{CacheEntry, CacheStore, DeleteFilter, DocumentStore, IndexMatch, VectorEntry, VectorIndex};

/// SQLite persistence for documents, vectors, conversations, and the
/// analysis cache.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let format_str: String = row.get("format");
    let format = DocumentFormat::parse(&format_str)
        .ok_or_else(|| anyhow::anyhow!("unknown document format: {}", format_str))?;
    let offsets_json: String = row.get("page_offsets_json");
    let page_offsets: Vec<usize> = serde_json::from_str(&offsets_json)?;

    Ok(Document {
        id: row.get("id"),
        notebook_id: row.get("notebook_id"),
        filename: row.get("filename"),
        format,
        body: row.get("body"),
        page_offsets,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors
                    (chunk_id, notebook_id, document_id, filename, page, chunk_index, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    notebook_id = excluded.notebook_id,
                    document_id = excluded.document_id,
                    filename = excluded.filename,
                    page = excluded.page,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&entry.chunk_id)
            .bind(&entry.metadata.notebook_id)
            .bind(&entry.metadata.document_id)
            .bind(&entry.metadata.filename)
            .bind(entry.metadata.page.map(|p| p as i64))
            .bind(entry.metadata.chunk_index)
            .bind(&entry.metadata.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, filter: &DeleteFilter) -> Result<()> {
        match filter {
            DeleteFilter::Document(id) => {
                sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            DeleteFilter::Notebook(id) => {
                sqlx::query("DELETE FROM chunk_vectors WHERE notebook_id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, notebook_id, document_id, filename, page, chunk_index, text, embedding
            FROM chunk_vectors
            WHERE notebook_id = ?
            "#,
        )
        .bind(&scope.notebook_id)
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<IndexMatch> = rows
            .iter()
            .filter_map(|row| {
                let document_id: String = row.get("document_id");
                if let Some(ids) = &scope.document_ids {
                    if !ids.iter().any(|id| id == &document_id) {
                        return None;
                    }
                }

                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let page: Option<i64> = row.get("page");

                Some(IndexMatch {
                    chunk_id: row.get("chunk_id"),
                    score: cosine_similarity(vector, &stored),
                    metadata: ChunkMetadata {
                        notebook_id: row.get("notebook_id"),
                        document_id,
                        filename: row.get("filename"),
                        page: page.map(|p| p as u32),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                    },
                })
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
impl DocumentStore for SqliteStore {
    async fn put_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, notebook_id, filename, format, body, page_offsets_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                notebook_id = excluded.notebook_id,
                filename = excluded.filename,
                format = excluded.format,
                body = excluded.body,
                page_offsets_json = excluded.page_offsets_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.notebook_id)
        .bind(&doc.filename)
        .bind(doc.format.as_str())
        .bind(&doc.body)
        .bind(serde_json::to_string(&doc.page_offsets)?)
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self, notebook_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE notebook_id = ? ORDER BY created_at, id",
        )
        .bind(notebook_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn count_documents(&self, scope: &ScopeFilter) -> Result<u64> {
        let rows = sqlx::query("SELECT id FROM documents WHERE notebook_id = ?")
            .bind(&scope.notebook_id)
            .fetch_all(&self.pool)
            .await?;

        let count = rows
            .iter()
            .map(|row| row.get::<String, _>("id"))
            .filter(|id| match &scope.document_ids {
                Some(ids) => ids.iter().any(|want| want == id),
                None => true,
            })
            .count();
        Ok(count as u64)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn put_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, page, chunk_index, text, hash)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.page.map(|p| p as i64))
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let page: Option<i64> = row.get("page");
                Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    page: page.map(|p| p as u32),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                }
            })
            .collect())
    }

    async fn append_turn(&self, notebook_id: &str, turn: &ConversationTurn) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_turns (notebook_id, role, text, citations_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(notebook_id)
        .bind(turn.role.as_str())
        .bind(&turn.text)
        .bind(serde_json::to_string(&turn.citations)?)
        .bind(turn.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        notebook_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT role, text, citations_json, created_at
            FROM conversation_turns
            WHERE notebook_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(notebook_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<ConversationTurn> = rows
            .iter()
            .map(|row| {
                let role_str: String = row.get("role");
                let role = Role::parse(&role_str)
                    .ok_or_else(|| anyhow::anyhow!("unknown role: {}", role_str))?;
                let citations_json: String = row.get("citations_json");
                Ok(ConversationTurn {
                    role,
                    text: row.get("text"),
                    citations: serde_json::from_str(&citations_json)?,
                    created_at: row.get("created_at"),
                })
            })
            .collect::<Result<_>>()?;

        turns.reverse();
        Ok(turns)
    }

    async fn put_question_set(&self, set: &QuestionSet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO question_sets (id, notebook_id, spec_json, questions_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                spec_json = excluded.spec_json,
                questions_json = excluded.questions_json
            "#,
        )
        .bind(&set.id)
        .bind(&set.notebook_id)
        .bind(serde_json::to_string(&set.spec)?)
        .bind(serde_json::to_string(&set.questions)?)
        .bind(set.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_question_set(&self, id: &str) -> Result<Option<QuestionSet>> {
        let row = sqlx::query("SELECT * FROM question_sets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let spec_json: String = row.get("spec_json");
            let questions_json: String = row.get("questions_json");
            Ok(QuestionSet {
                id: row.get("id"),
                notebook_id: row.get("notebook_id"),
                spec: serde_json::from_str(&spec_json)?,
                questions: serde_json::from_str(&questions_json)?,
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT key, document_id, value_json, created_at FROM analysis_cache WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CacheEntry {
            key: row.get("key"),
            document_id: row.get("document_id"),
            value: row.get("value_json"),
            created_at: row.get("created_at"),
        }))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_cache (key, document_id, value_json, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                document_id = excluded.document_id,
                value_json = excluded.value_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.document_id)
        .bind(&entry.value)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM analysis_cache WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM analysis_cache WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
