//! Core data models used throughout Lectern.
//!
//! These types represent the documents, chunks, retrieval results, and
//! conversation turns that flow through the ingestion, query, and analysis
//! pipelines.

use serde::{Deserialize, Serialize};

/// Source format of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Pdf => "pdf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(DocumentFormat::Text),
            "markdown" => Some(DocumentFormat::Markdown),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

/// Normalized document, immutable once chunked.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub notebook_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    /// Extracted full text.
    pub body: String,
    /// Byte offsets into `body` where each page starts (first entry is 0,
    /// all entries lie on char boundaries). Empty for non-paged formats.
    pub page_offsets: Vec<usize>,
    pub created_at: i64,
}

impl Document {
    /// 1-based page number containing the given byte offset, or `None`
    /// for non-paged documents.
    pub fn page_of_offset(&self, offset: usize) -> Option<u32> {
        if self.page_offsets.is_empty() {
            return None;
        }
        let idx = self.page_offsets.partition_point(|&start| start <= offset);
        Some(idx as u32)
    }

    /// Number of pages, or 0 for non-paged documents.
    pub fn page_count(&self) -> usize {
        self.page_offsets.len()
    }

    /// Text of the given 1-based page.
    pub fn page_text(&self, page: u32) -> Option<&str> {
        let idx = page.checked_sub(1)? as usize;
        let start = *self.page_offsets.get(idx)?;
        let end = self
            .page_offsets
            .get(idx + 1)
            .copied()
            .unwrap_or(self.body.len());
        self.body.get(start..end)
    }
}

/// A chunk of a document's body text, the unit of embedding and retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// 1-based page containing the chunk's starting offset; `None` for
    /// non-paged formats.
    pub page: Option<u32>,
    /// Dense, monotonic ordinal within the document, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of the chunk text, for staleness detection.
    pub hash: String,
}

/// Metadata stored alongside each vector in the index. Carries everything
/// needed to reconstruct a citation without a secondary lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub notebook_id: String,
    pub document_id: String,
    pub filename: String,
    pub page: Option<u32>,
    pub chunk_index: i64,
    pub text: String,
}

/// A ranked chunk returned by the retriever.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity; higher is more relevant.
    pub score: f32,
    /// 0-based position in the result list.
    pub rank: usize,
}

/// Provenance record attached to a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub filename: String,
    pub page: Option<u32>,
    pub chunk_index: i64,
    pub score: f32,
}

/// Speaker role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn of a notebook's conversation, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub created_at: i64,
}

/// A generated answer with its source citations.
#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// Restricts retrieval to a notebook and, optionally, a subset of its
/// documents.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    pub notebook_id: String,
    pub document_ids: Option<Vec<String>>,
}

impl ScopeFilter {
    pub fn notebook(notebook_id: impl Into<String>) -> Self {
        Self {
            notebook_id: notebook_id.into(),
            document_ids: None,
        }
    }

    /// Whether a vector's metadata falls inside this scope.
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        if meta.notebook_id != self.notebook_id {
            return false;
        }
        match &self.document_ids {
            Some(ids) => ids.iter().any(|id| id == &meta.document_id),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_pages(body: &str, page_offsets: Vec<usize>) -> Document {
        Document {
            id: "d1".to_string(),
            notebook_id: "n1".to_string(),
            filename: "a.pdf".to_string(),
            format: DocumentFormat::Pdf,
            body: body.to_string(),
            page_offsets,
            created_at: 0,
        }
    }

    #[test]
    fn page_of_offset_attributes_to_containing_page() {
        let doc = doc_with_pages("aaaaabbbbbccccc", vec![0, 5, 10]);
        assert_eq!(doc.page_of_offset(0), Some(1));
        assert_eq!(doc.page_of_offset(4), Some(1));
        assert_eq!(doc.page_of_offset(5), Some(2));
        assert_eq!(doc.page_of_offset(12), Some(3));
    }

    #[test]
    fn page_of_offset_none_for_non_paged() {
        let doc = doc_with_pages("hello", vec![]);
        assert_eq!(doc.page_of_offset(2), None);
    }

    #[test]
    fn page_text_slices_by_boundaries() {
        let doc = doc_with_pages("aaaaabbbbbccccc", vec![0, 5, 10]);
        assert_eq!(doc.page_text(1), Some("aaaaa"));
        assert_eq!(doc.page_text(2), Some("bbbbb"));
        assert_eq!(doc.page_text(3), Some("ccccc"));
        assert_eq!(doc.page_text(4), None);
        assert_eq!(doc.page_text(0), None);
    }

    #[test]
    fn scope_filter_restricts_by_notebook_and_documents() {
        let meta = ChunkMetadata {
            notebook_id: "n1".to_string(),
            document_id: "d1".to_string(),
            filename: "a.txt".to_string(),
            page: None,
            chunk_index: 0,
            text: String::new(),
        };

        assert!(ScopeFilter::notebook("n1").matches(&meta));
        assert!(!ScopeFilter::notebook("n2").matches(&meta));

        let scoped = ScopeFilter {
            notebook_id: "n1".to_string(),
            document_ids: Some(vec!["d2".to_string()]),
        };
        assert!(!scoped.matches(&meta));
    }
}
