//! Prompt context assembly from retrieved chunks.
//!
//! Merges ranked chunks into a bounded context string plus the citation
//! list that lets an answer point back at its sources.

use crate::models::{Citation, RetrievalResult};

const SEPARATOR: &str = "\n\n";

/// Concatenate chunk texts in rank order up to `budget_chars` chars.
///
/// The chunk that crosses the budget is truncated (on a char boundary)
/// rather than dropping already-included higher-ranked chunks; anything
/// after it is omitted. Returns one [`Citation`] per included chunk, in
/// inclusion order.
pub fn assemble(results: &[RetrievalResult], budget_chars: usize) -> (String, Vec<Citation>) {
    let mut context = String::new();
    let mut citations = Vec::new();
    let mut used = 0usize;

    for result in results {
        let sep_cost = if context.is_empty() { 0 } else { SEPARATOR.len() };
        let remaining = match budget_chars.checked_sub(used + sep_cost) {
            Some(r) if r > 0 => r,
            _ => break,
        };

        let text_chars = result.metadata.text.chars().count();
        let take = text_chars.min(remaining);
        if take == 0 {
            break;
        }

        if sep_cost > 0 {
            context.push_str(SEPARATOR);
        }
        if take == text_chars {
            context.push_str(&result.metadata.text);
        } else {
            context.extend(result.metadata.text.chars().take(take));
        }
        used += sep_cost + take;

        citations.push(Citation {
            document_id: result.metadata.document_id.clone(),
            filename: result.metadata.filename.clone(),
            page: result.metadata.page,
            chunk_index: result.metadata.chunk_index,
            score: result.score,
        });

        if take < text_chars {
            break;
        }
    }

    (context, citations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn result(text: &str, index: i64, score: f32, rank: usize) -> RetrievalResult {
        RetrievalResult {
            chunk_id: format!("d1:{}", index),
            metadata: ChunkMetadata {
                notebook_id: "n1".to_string(),
                document_id: "d1".to_string(),
                filename: "a.txt".to_string(),
                page: Some(1),
                chunk_index: index,
                text: text.to_string(),
            },
            score,
            rank,
        }
    }

    #[test]
    fn all_chunks_fit_within_budget() {
        let results = vec![result("alpha", 0, 0.9, 0), result("beta", 1, 0.8, 1)];
        let (context, citations) = assemble(&results, 100);
        assert_eq!(context, "alpha\n\nbeta");
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].chunk_index, 0);
        assert_eq!(citations[1].chunk_index, 1);
    }

    #[test]
    fn lowest_ranked_chunk_is_truncated_not_dropped() {
        let results = vec![
            result("0123456789", 0, 0.9, 0),
            result("abcdefghij", 1, 0.8, 1),
        ];
        // 10 (first) + 2 (separator) + 4 remaining
        let (context, citations) = assemble(&results, 16);
        assert_eq!(context, "0123456789\n\nabcd");
        assert_eq!(citations.len(), 2);
    }

    #[test]
    fn chunks_past_the_budget_are_omitted() {
        let results = vec![
            result("0123456789", 0, 0.9, 0),
            result("abcdefghij", 1, 0.8, 1),
            result("never", 2, 0.7, 2),
        ];
        let (context, citations) = assemble(&results, 16);
        assert!(!context.contains("never"));
        assert_eq!(citations.len(), 2);
    }

    #[test]
    fn empty_results_empty_context() {
        let (context, citations) = assemble(&[], 100);
        assert!(context.is_empty());
        assert!(citations.is_empty());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let results = vec![result("ééééé", 0, 0.9, 0)];
        let (context, citations) = assemble(&results, 3);
        assert_eq!(context.chars().count(), 3);
        assert_eq!(citations.len(), 1);
    }

    #[test]
    fn citation_order_matches_inclusion_order() {
        let results = vec![
            result("one", 7, 0.9, 0),
            result("two", 3, 0.8, 1),
            result("three", 5, 0.7, 2),
        ];
        let (_, citations) = assemble(&results, 100);
        let indices: Vec<i64> = citations.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![7, 3, 5]);
    }
}
