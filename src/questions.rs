//! Structured question-set generation (quizzes, mock tests, study sets).
//!
//! Reuses the retriever to gather diverse source chunks for a scope, asks
//! the completion service for strictly machine-parseable JSON, and
//! validates the returned structure before accepting it. Malformed output
//! is retried exactly once — a bounded policy, not a loop until success —
//! after which the request fails with
//! [`GenerationFailed`](crate::error::Error::GenerationFailed).

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::completion::{extract_json, CompletionClient};
use crate::error::{Error, Result};
use crate::models::{RetrievalResult, ScopeFilter};
use crate::retrieve::Retriever;
use crate::store::DocumentStore;

/// Number of options every multiple-choice question must carry.
pub const MC_OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionFormat {
    MultipleChoice,
    Theory,
    Coding,
    Reorder,
}

/// What to generate: how many questions, how hard, in which format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSetSpec {
    pub count: usize,
    pub difficulty: Difficulty,
    pub format: QuestionFormat,
    /// Mark-value buckets (e.g. 2/5/10) for analysis-derived theory sets;
    /// when present every theory question must land in one of them.
    #[serde(default)]
    pub mark_buckets: Option<Vec<u32>>,
    /// Target language for coding questions.
    #[serde(default)]
    pub programming_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleChoiceQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options`, in `[0, 3]`.
    pub correct_answer: usize,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheoryQuestion {
    pub question: String,
    #[serde(default)]
    pub topic: String,
    pub expected_points: Vec<String>,
    #[serde(default)]
    pub marks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingTestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingQuestion {
    pub question: String,
    #[serde(default)]
    pub topic: String,
    pub function_signature: String,
    pub language: String,
    #[serde(default)]
    pub test_cases: Vec<CodingTestCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderQuestion {
    pub question: String,
    #[serde(default)]
    pub topic: String,
    /// Items as shown to the student (shuffled).
    pub items: Vec<String>,
    /// The same items in correct order.
    pub correct_order: Vec<String>,
}

/// One generated question, tagged by format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Question {
    MultipleChoice(MultipleChoiceQuestion),
    Theory(TheoryQuestion),
    Coding(CodingQuestion),
    Reorder(ReorderQuestion),
}

/// A validated, persisted question set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: String,
    pub notebook_id: String,
    pub spec: QuestionSetSpec,
    pub questions: Vec<Question>,
    pub created_at: i64,
}

/// Generates validated question sets from retrieved content.
pub struct QuestionSetGenerator {
    retriever: Arc<Retriever>,
    client: Arc<dyn CompletionClient>,
    store: Arc<dyn DocumentStore>,
}

impl QuestionSetGenerator {
    pub fn new(
        retriever: Arc<Retriever>,
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            retriever,
            client,
            store,
        }
    }

    /// Generate, validate, and persist a question set for the scope.
    ///
    /// Propagates [`Error::NoContentAvailable`] from retrieval without
    /// touching the model. Malformed model output is retried once.
    pub async fn generate(
        &self,
        scope: &ScopeFilter,
        spec: &QuestionSetSpec,
    ) -> Result<QuestionSet> {
        if spec.count == 0 {
            return Err(Error::InvalidConfig(
                "question count must be >= 1".to_string(),
            ));
        }

        let chunks = self.gather_chunks(scope, spec.count).await?;
        let context: Vec<&str> = chunks.iter().map(|c| c.metadata.text.as_str()).collect();
        let prompt = build_prompt(spec, &context.join("\n\n"));

        let mut last_reason = String::new();

        // One attempt plus exactly one retry on malformed output.
        for attempt in 0..2 {
            if attempt > 0 {
                log::warn!("retrying question generation: {}", last_reason);
            }

            let raw = self
                .client
                .complete(&prompt)
                .await
                .map_err(|e| Error::GenerationFailed(e.to_string()))?;

            match parse_and_validate(&raw, spec) {
                Ok(questions) => {
                    let set = QuestionSet {
                        id: Uuid::new_v4().to_string(),
                        notebook_id: scope.notebook_id.clone(),
                        spec: spec.clone(),
                        questions,
                        created_at: chrono::Utc::now().timestamp(),
                    };
                    self.store
                        .put_question_set(&set)
                        .await
                        .map_err(Error::storage)?;
                    return Ok(set);
                }
                Err(reason) => last_reason = reason,
            }
        }

        Err(Error::GenerationFailed(format!(
            "malformed structured output after retry: {}",
            last_reason
        )))
    }

    /// Gather diverse source chunks by running several probe retrievals
    /// and deduplicating by chunk id, the same trick the chat path's
    /// retriever uses for a single query.
    async fn gather_chunks(
        &self,
        scope: &ScopeFilter,
        count: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let probes = (count * 2).clamp(1, 10);
        let mut seen: HashSet<String> = HashSet::new();
        let mut gathered = Vec::new();

        for i in 0..probes {
            let probe = format!("important study topic {}", i + 1);
            let results = self.retriever.retrieve(&probe, scope, 3).await?;
            for result in results {
                if seen.insert(result.chunk_id.clone()) {
                    gathered.push(result);
                }
            }
        }

        if gathered.is_empty() {
            return Err(Error::NoContentAvailable);
        }

        gathered.truncate(count * 2);
        Ok(gathered)
    }
}

fn build_prompt(spec: &QuestionSetSpec, context: &str) -> String {
    let mut prompt = format!(
        "Based on the following content from educational documents, generate \
         exactly {} {} questions at {} difficulty.\n\nContent:\n{}\n\n",
        spec.count,
        match spec.format {
            QuestionFormat::MultipleChoice => "multiple-choice",
            QuestionFormat::Theory => "theory",
            QuestionFormat::Coding => "coding",
            QuestionFormat::Reorder => "reordering",
        },
        spec.difficulty.as_str(),
        context,
    );

    match spec.format {
        QuestionFormat::MultipleChoice => prompt.push_str(
            "Each question must have exactly 4 options and indicate the correct one.\n\
             Format your response as a JSON array with this structure:\n\
             [{\"question\": \"...?\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \
             \"correct_answer\": 0, \"explanation\": \"...\", \"topic\": \"...\"}]\n",
        ),
        QuestionFormat::Theory => {
            prompt.push_str(
                "Each question must require a written explanation and list the key \
                 points a full answer would cover.\n\
                 Format your response as a JSON array with this structure:\n\
                 [{\"question\": \"...?\", \"topic\": \"...\", \
                 \"expected_points\": [\"point 1\", \"point 2\"], \"marks\": 5}]\n",
            );
            if let Some(buckets) = &spec.mark_buckets {
                let list: Vec<String> = buckets.iter().map(|b| b.to_string()).collect();
                prompt.push_str(&format!(
                    "Assign each question a marks value from: {}.\n",
                    list.join(", ")
                ));
            }
        }
        QuestionFormat::Coding => {
            let language = spec
                .programming_language
                .as_deref()
                .unwrap_or("python");
            prompt.push_str(&format!(
                "Each question must be a coding problem in {} with an appropriate \
                 function signature and at least one test case.\n\
                 Format your response as a JSON array with this structure:\n\
                 [{{\"question\": \"...\", \"topic\": \"...\", \
                 \"function_signature\": \"...\", \"language\": \"{}\", \
                 \"test_cases\": [{{\"input\": \"...\", \"expected_output\": \"...\"}}]}}]\n",
                language, language
            ));
        }
        QuestionFormat::Reorder => prompt.push_str(
            "Each question presents shuffled steps of a procedure; `items` holds \
             the shuffled order shown to the student and `correct_order` the same \
             items in the right sequence.\n\
             Format your response as a JSON array with this structure:\n\
             [{\"question\": \"Put these steps in the correct order:\", \
             \"topic\": \"...\", \"items\": [\"...\"], \"correct_order\": [\"...\"]}]\n",
        ),
    }

    prompt.push_str("IMPORTANT: Return ONLY the JSON array, no additional text.");
    prompt
}

/// Parse model output and enforce the structural contract for the spec.
/// The error string names the first violation, for the retry log line.
fn parse_and_validate(raw: &str, spec: &QuestionSetSpec) -> std::result::Result<Vec<Question>, String> {
    let json = extract_json(raw).ok_or_else(|| "no JSON found in output".to_string())?;

    let questions: Vec<Question> = match spec.format {
        QuestionFormat::MultipleChoice => {
            let parsed: Vec<MultipleChoiceQuestion> =
                serde_json::from_str(json).map_err(|e| e.to_string())?;
            for (i, q) in parsed.iter().enumerate() {
                if q.question.trim().is_empty() {
                    return Err(format!("question {} is empty", i));
                }
                if q.options.len() != MC_OPTION_COUNT {
                    return Err(format!(
                        "question {} has {} options, expected {}",
                        i,
                        q.options.len(),
                        MC_OPTION_COUNT
                    ));
                }
                if q.correct_answer >= MC_OPTION_COUNT {
                    return Err(format!(
                        "question {} has correct_answer {} out of range",
                        i, q.correct_answer
                    ));
                }
            }
            parsed.into_iter().map(Question::MultipleChoice).collect()
        }
        QuestionFormat::Theory => {
            let parsed: Vec<TheoryQuestion> =
                serde_json::from_str(json).map_err(|e| e.to_string())?;
            for (i, q) in parsed.iter().enumerate() {
                if q.question.trim().is_empty() {
                    return Err(format!("question {} is empty", i));
                }
                if q.expected_points.is_empty() {
                    return Err(format!("question {} has no expected points", i));
                }
                if let Some(buckets) = &spec.mark_buckets {
                    match q.marks {
                        Some(m) if buckets.contains(&m) => {}
                        Some(m) => {
                            return Err(format!("question {} has marks {} outside buckets", i, m))
                        }
                        None => return Err(format!("question {} is missing marks", i)),
                    }
                }
            }
            parsed.into_iter().map(Question::Theory).collect()
        }
        QuestionFormat::Coding => {
            let parsed: Vec<CodingQuestion> =
                serde_json::from_str(json).map_err(|e| e.to_string())?;
            for (i, q) in parsed.iter().enumerate() {
                if q.question.trim().is_empty() {
                    return Err(format!("question {} is empty", i));
                }
                if q.function_signature.trim().is_empty() {
                    return Err(format!("question {} is missing a function signature", i));
                }
            }
            parsed.into_iter().map(Question::Coding).collect()
        }
        QuestionFormat::Reorder => {
            let parsed: Vec<ReorderQuestion> =
                serde_json::from_str(json).map_err(|e| e.to_string())?;
            for (i, q) in parsed.iter().enumerate() {
                if q.items.len() < 2 {
                    return Err(format!("question {} has fewer than 2 items", i));
                }
                let mut shown = q.items.clone();
                let mut correct = q.correct_order.clone();
                shown.sort();
                correct.sort();
                if shown != correct {
                    return Err(format!(
                        "question {}: correct_order is not a permutation of items",
                        i
                    ));
                }
            }
            parsed.into_iter().map(Question::Reorder).collect()
        }
    };

    if questions.len() != spec.count {
        return Err(format!(
            "expected {} questions, got {}",
            spec.count,
            questions.len()
        ));
    }

    Ok(questions)
}
