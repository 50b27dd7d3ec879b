//! Grounded answer generation.
//!
//! Sends a grounding instruction plus assembled context and recent
//! conversation history to the completion service, and attaches the
//! citations that came out of retrieval. Citations are never invented
//! here — the answer carries exactly the retrieved set.

use std::sync::Arc;

use crate::completion::CompletionClient;
use crate::error::{Error, Result};
use crate::models::{AnswerResult, Citation, ConversationTurn};

/// Substituted for the answer text when the model call fails on the chat
/// path; the failed turn is recorded with no citations.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I couldn't generate an answer right now. Please try again in a moment.";

/// Generates cited answers from assembled context.
pub struct AnswerGenerator {
    client: Arc<dyn CompletionClient>,
    history_turns: usize,
}

impl AnswerGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, history_turns: usize) -> Self {
        Self {
            client,
            history_turns,
        }
    }

    /// Answer `question` from `context_text`, carrying over the last few
    /// turns of conversation. Model failure surfaces as
    /// [`Error::GenerationFailed`].
    pub async fn answer(
        &self,
        question: &str,
        context_text: &str,
        citations: Vec<Citation>,
        history: &[ConversationTurn],
    ) -> Result<AnswerResult> {
        let prompt = self.build_prompt(question, context_text, history);

        let text = self
            .client
            .complete(&prompt)
            .await
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;

        Ok(AnswerResult {
            text: text.trim().to_string(),
            citations,
        })
    }

    /// Chat-path variant: a failed model call degrades to the fixed
    /// fallback message with empty citations instead of an error.
    pub async fn answer_or_fallback(
        &self,
        question: &str,
        context_text: &str,
        citations: Vec<Citation>,
        history: &[ConversationTurn],
    ) -> AnswerResult {
        match self
            .answer(question, context_text, citations, history)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                log::warn!("answer generation failed: {}", e);
                AnswerResult {
                    text: FALLBACK_ANSWER.to_string(),
                    citations: Vec::new(),
                }
            }
        }
    }

    fn build_prompt(
        &self,
        question: &str,
        context_text: &str,
        history: &[ConversationTurn],
    ) -> String {
        let mut prompt = String::from(
            "Answer the question using only the context below, taken from the \
             user's uploaded documents. If the answer cannot be found in the \
             context, say so instead of guessing.\n\nContext:\n",
        );
        prompt.push_str(context_text);

        let start = history.len().saturating_sub(self.history_turns);
        let recent = &history[start..];
        if !recent.is_empty() {
            prompt.push_str("\n\nRecent conversation:\n");
            for turn in recent {
                prompt.push_str(turn.role.as_str());
                prompt.push_str(": ");
                prompt.push_str(&turn.text);
                prompt.push('\n');
            }
        }

        prompt.push_str("\nQuestion: ");
        prompt.push_str(question);
        prompt.push_str("\n\nAnswer:");
        prompt
    }
}
