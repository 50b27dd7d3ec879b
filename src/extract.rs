//! Text extraction for ingestable documents.
//!
//! Extraction is a thin seam in front of the pipeline: each format turns
//! raw bytes into `(full_text, page_offsets)` and nothing else. Page
//! offsets are byte positions (on char boundaries) where each page starts,
//! empty for content without a page structure. Any failure here aborts
//! ingestion for that document before it reaches the core.

use crate::error::{Error, Result};
use crate::models::DocumentFormat;

/// Page-break character emitted between PDF pages by the extractor.
const FORM_FEED: char = '\u{000C}';

/// Extraction output consumed by the chunker.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_offsets: Vec<usize>,
}

/// Extract text from raw bytes according to the format.
pub fn extract(bytes: &[u8], format: DocumentFormat) -> Result<ExtractedDocument> {
    match format {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Extraction(format!("invalid UTF-8: {}", e)))?;
            if text.contains(FORM_FEED) {
                Ok(paginate(&text))
            } else {
                Ok(ExtractedDocument {
                    text,
                    page_offsets: Vec::new(),
                })
            }
        }
        DocumentFormat::Pdf => {
            let raw = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| Error::Extraction(format!("PDF extraction failed: {}", e)))?;
            Ok(paginate(&raw))
        }
    }
}

/// Split extracted text on form-feed page breaks, recording the byte
/// offset where each (non-empty) page starts. Text with no breaks becomes
/// a single page.
fn paginate(raw: &str) -> ExtractedDocument {
    let mut text = String::new();
    let mut page_offsets = Vec::new();

    for segment in raw.split(FORM_FEED) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        page_offsets.push(text.len());
        text.push_str(trimmed);
        text.push('\n');
    }

    ExtractedDocument { text, page_offsets }
}

/// Infer the document format from a filename extension.
pub fn format_for_path(path: &std::path::Path) -> Option<DocumentFormat> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => Some(DocumentFormat::Pdf),
        Some("md") | Some("markdown") => Some(DocumentFormat::Markdown),
        Some("txt") | Some("text") => Some(DocumentFormat::Text),
        _ => None,
    }
}

/// Read and extract a file from disk.
pub fn extract_file(path: &std::path::Path) -> Result<(DocumentFormat, ExtractedDocument)> {
    let format = format_for_path(path).ok_or_else(|| {
        Error::Extraction(format!("unsupported file type: {}", path.display()))
    })?;
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Extraction(format!("failed to read {}: {}", path.display(), e)))?;
    Ok((format, extract(&bytes, format)?))
}
