//! Fixed-window text chunker with overlap.
//!
//! Splits document body text into overlapping windows of `window_chars`
//! chars, stepping by `window_chars - overlap_chars`, so context at chunk
//! boundaries is not lost. Each chunk is tagged with the 1-based page that
//! contains its starting offset and a dense ordinal index starting at 0.
//!
//! Chunking is deterministic: identical input always produces identical
//! chunks, ids included. Windows are measured in `char`s and sliced on
//! char boundaries, so multi-byte text is never split mid-codepoint.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Split text into overlapping fixed-size chunks.
///
/// `page_offsets` holds the byte offset where each page starts (empty for
/// non-paged formats); a chunk spanning a page boundary is attributed to
/// the page containing its starting offset.
///
/// Empty text yields no chunks; text shorter than the window yields exactly
/// one. Returns an error when `overlap_chars >= window_chars`, since the
/// window could not advance.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    page_offsets: &[usize],
    window_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<Chunk>> {
    if window_chars == 0 || overlap_chars >= window_chars {
        return Err(Error::InvalidConfig(format!(
            "chunk overlap ({}) must be < window ({})",
            overlap_chars, window_chars
        )));
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char, so windows slice on char boundaries.
    let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total_chars = char_starts.len();
    let step = window_chars - overlap_chars;

    let mut chunks = Vec::with_capacity(total_chars.div_ceil(step));
    let mut start = 0usize;
    let mut chunk_index: i64 = 0;

    while start < total_chars {
        let end = (start + window_chars).min(total_chars);
        let byte_start = char_starts[start];
        let byte_end = if end < total_chars {
            char_starts[end]
        } else {
            text.len()
        };

        chunks.push(make_chunk(
            document_id,
            chunk_index,
            &text[byte_start..byte_end],
            page_of(byte_start, page_offsets),
        ));

        chunk_index += 1;
        start += step;
    }

    Ok(chunks)
}

fn page_of(byte_offset: usize, page_offsets: &[usize]) -> Option<u32> {
    if page_offsets.is_empty() {
        return None;
    }
    Some(page_offsets.partition_point(|&s| s <= byte_offset) as u32)
}

fn make_chunk(document_id: &str, index: i64, text: &str, page: Option<u32>) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        // Deterministic id so re-ingesting identical content upserts in place.
        id: format!("{}:{}", document_id, index),
        document_id: document_id.to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
