//! Incremental page-by-page document analysis with progress streaming.
//!
//! A [`PageAnalyzer`] walks a document's pages in order. For each page it
//! consults the [`AnalysisCache`] first; on a hit the cached result is
//! emitted with no model call, on a miss the completion service produces a
//! [`PageAnalysis`] that is written to the cache before being emitted.
//! After every page a progress event reports pages done out of total.
//!
//! Events flow through a bounded `tokio::sync::mpsc` channel. The consumer
//! may drop the receiver at any time; the producer notices between pages
//! (cancellation is cooperative, never mid-page) and stops issuing model
//! calls. Cache entries already committed stay valid.
//!
//! A single page's failure is recorded as that page's `Failed` status and
//! the job keeps going — the terminal event reports a mixed tally rather
//! than aborting the whole run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::cache::{AnalysisCache, AnalysisMode, CacheKey};
use crate::completion::{extract_json, CompletionClient};
use crate::models::Document;
use crate::store::DocumentStore;

/// One highlighted passage on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub text: String,
    pub reason: String,
}

/// A study question generated from a page, weighted by mark value
/// (2 = short recall, 5 = explanation, 10 = in-depth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQuestion {
    pub question: String,
    pub answer: String,
    pub marks: u32,
}

/// The cached unit of analysis work for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub highlights: Vec<Highlight>,
    pub questions: Vec<PageQuestion>,
}

/// How a page's result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Served from the cache, no model call.
    Cached,
    /// Freshly computed and written to the cache.
    Computed,
    /// The model call or output parse failed; the job continued.
    Failed,
}

/// Events emitted over the analysis stream, in page order.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// A page finished (one per page, in order).
    Page {
        page: u32,
        status: PageStatus,
        analysis: Option<PageAnalysis>,
    },
    /// Emitted after each page.
    Progress { done: usize, total: usize },
    /// Terminal: every page was visited.
    Finished {
        computed: usize,
        cached: usize,
        failed: usize,
    },
    /// Terminal: the job could not start.
    Failed { error: String },
    /// Terminal: the caller cancelled between pages.
    Cancelled { done: usize, total: usize },
}

/// A page-analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub document_id: String,
    /// 1-based pages to analyze, in the order given; empty = all pages.
    pub pages: Vec<u32>,
    pub mode: AnalysisMode,
    /// Criteria for [`AnalysisMode::CustomPrompt`]; ignored otherwise.
    pub custom_prompt: Option<String>,
}

/// Cancellation handle for a running analysis job. Each job gets its own
/// handle; concurrent jobs never share state.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-job bookkeeping: per-page outcomes in processing order, plus the
/// derived tallies and progress fraction. Lives only as long as its
/// stream; nothing here is persisted.
#[derive(Debug)]
struct AnalysisJob {
    total: usize,
    statuses: Vec<(u32, PageStatus)>,
}

impl AnalysisJob {
    fn new(total: usize) -> Self {
        Self {
            total,
            statuses: Vec::with_capacity(total),
        }
    }

    fn record(&mut self, page: u32, status: PageStatus) {
        self.statuses.push((page, status));
    }

    fn done(&self) -> usize {
        self.statuses.len()
    }

    fn tally(&self, wanted: PageStatus) -> usize {
        self.statuses.iter().filter(|(_, s)| *s == wanted).count()
    }

    #[allow(dead_code)]
    fn progress(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.done() as f32 / self.total as f32
        }
    }
}

/// Orchestrates per-page analysis jobs.
#[derive(Clone)]
pub struct PageAnalyzer {
    store: Arc<dyn DocumentStore>,
    cache: Arc<AnalysisCache>,
    client: Arc<dyn CompletionClient>,
    page_budget_chars: usize,
}

impl PageAnalyzer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<AnalysisCache>,
        client: Arc<dyn CompletionClient>,
        page_budget_chars: usize,
    ) -> Self {
        Self {
            store,
            cache,
            client,
            page_budget_chars,
        }
    }

    /// Start an analysis job, returning its cancellation handle and event
    /// stream. Independent jobs may run concurrently; each is sequential
    /// over its own pages.
    pub fn stream(&self, request: AnalysisRequest) -> (JobHandle, mpsc::Receiver<AnalysisEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = JobHandle::default();
        let analyzer = self.clone();
        let job_handle = handle.clone();

        tokio::spawn(async move {
            analyzer.run(request, job_handle, tx).await;
        });

        (handle, rx)
    }

    async fn run(
        &self,
        request: AnalysisRequest,
        handle: JobHandle,
        tx: mpsc::Sender<AnalysisEvent>,
    ) {
        let doc = match self.store.get_document(&request.document_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                let _ = tx
                    .send(AnalysisEvent::Failed {
                        error: format!("document not found: {}", request.document_id),
                    })
                    .await;
                return;
            }
            Err(e) => {
                let _ = tx
                    .send(AnalysisEvent::Failed {
                        error: format!("document lookup failed: {}", e),
                    })
                    .await;
                return;
            }
        };

        let pages = resolve_pages(&doc, &request.pages);
        if pages.is_empty() {
            let _ = tx
                .send(AnalysisEvent::Failed {
                    error: "no pages to analyze".to_string(),
                })
                .await;
            return;
        }

        let mut job = AnalysisJob::new(pages.len());

        for page in pages {
            // Cooperative cancellation point: between pages only, so no
            // partial page result is ever emitted.
            if handle.is_cancelled() || tx.is_closed() {
                let _ = tx
                    .send(AnalysisEvent::Cancelled {
                        done: job.done(),
                        total: job.total,
                    })
                    .await;
                return;
            }

            let (status, analysis) = self.analyze_page(&doc, page, &request).await;
            job.record(page, status);

            if tx
                .send(AnalysisEvent::Page {
                    page,
                    status,
                    analysis,
                })
                .await
                .is_err()
            {
                return;
            }
            if tx
                .send(AnalysisEvent::Progress {
                    done: job.done(),
                    total: job.total,
                })
                .await
                .is_err()
            {
                return;
            }
        }

        let _ = tx
            .send(AnalysisEvent::Finished {
                computed: job.tally(PageStatus::Computed),
                cached: job.tally(PageStatus::Cached),
                failed: job.tally(PageStatus::Failed),
            })
            .await;
    }

    async fn analyze_page(
        &self,
        doc: &Document,
        page: u32,
        request: &AnalysisRequest,
    ) -> (PageStatus, Option<PageAnalysis>) {
        let key = CacheKey::new(
            &doc.id,
            page,
            request.mode,
            request.custom_prompt.as_deref(),
        );

        match self.cache.get::<PageAnalysis>(&key).await {
            Ok(Some(analysis)) => return (PageStatus::Cached, Some(analysis)),
            Ok(None) => {}
            Err(e) => {
                // A broken cache read degrades to a recompute.
                log::warn!("cache read failed for page {}: {}", page, e);
            }
        }

        let text = match page_text(doc, page) {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                log::warn!("page {} of {} has no text", page, doc.id);
                return (PageStatus::Failed, None);
            }
        };

        let prompt = build_page_prompt(text, request, self.page_budget_chars);

        let raw = match self.client.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("analysis of page {} failed: {}", page, e);
                return (PageStatus::Failed, None);
            }
        };

        let analysis = match parse_page_analysis(&raw) {
            Some(a) => a,
            None => {
                log::warn!("unparseable analysis output for page {}", page);
                return (PageStatus::Failed, None);
            }
        };

        if let Err(e) = self.cache.put(&key, &analysis).await {
            // The result is still good; only reuse is lost.
            log::warn!("cache write failed for page {}: {}", page, e);
        }

        (PageStatus::Computed, Some(analysis))
    }
}

/// Resolve the requested page list: explicit pages as given, otherwise all
/// pages in order (a non-paged document counts as one page).
fn resolve_pages(doc: &Document, requested: &[u32]) -> Vec<u32> {
    if !requested.is_empty() {
        return requested.to_vec();
    }
    let count = doc.page_count().max(1);
    (1..=count as u32).collect()
}

/// Page text, treating a non-paged document as a single page 1.
fn page_text<'a>(doc: &'a Document, page: u32) -> Option<&'a str> {
    if doc.page_offsets.is_empty() {
        return (page == 1).then_some(doc.body.as_str());
    }
    doc.page_text(page)
}

fn build_page_prompt(text: &str, request: &AnalysisRequest, budget_chars: usize) -> String {
    let bounded: String = text.chars().take(budget_chars).collect();

    let mut prompt = String::from(
        "You are reviewing one page of a study document. Identify the most \
         important passages and write study questions about them.\n",
    );

    if request.mode == AnalysisMode::CustomPrompt {
        if let Some(criteria) = &request.custom_prompt {
            prompt.push_str("Focus specifically on: ");
            prompt.push_str(criteria);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nPage text:\n");
    prompt.push_str(&bounded);
    prompt.push_str(
        "\n\nRespond in this EXACT JSON format:\n\
         {\n\
         \x20 \"highlights\": [{\"text\": \"passage worth highlighting\", \"reason\": \"why it matters\"}],\n\
         \x20 \"questions\": [{\"question\": \"...\", \"answer\": \"...\", \"marks\": 2}]\n\
         }\n\
         Use marks of 2 for short recall, 5 for explanations, 10 for in-depth answers.\n\
         IMPORTANT: Return ONLY the JSON object, no additional text.",
    );

    prompt
}

fn parse_page_analysis(raw: &str) -> Option<PageAnalysis> {
    let json = extract_json(raw)?;
    serde_json::from_str(json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_tracks_per_page_status_and_progress() {
        let mut job = AnalysisJob::new(4);
        assert_eq!(job.progress(), 0.0);
        job.record(1, PageStatus::Cached);
        job.record(2, PageStatus::Computed);
        assert!((job.progress() - 0.5).abs() < 1e-6);
        job.record(3, PageStatus::Failed);
        job.record(4, PageStatus::Computed);
        assert_eq!(job.progress(), 1.0);
        assert_eq!(job.statuses[2], (3, PageStatus::Failed));
        assert_eq!(
            (
                job.tally(PageStatus::Computed),
                job.tally(PageStatus::Cached),
                job.tally(PageStatus::Failed)
            ),
            (2, 1, 1)
        );
    }

    #[test]
    fn parse_accepts_json_with_prose_around_it() {
        let raw = r#"Here is the analysis:
{"highlights": [{"text": "t", "reason": "r"}], "questions": [{"question": "q", "answer": "a", "marks": 5}]}
"#;
        let analysis = parse_page_analysis(raw).unwrap();
        assert_eq!(analysis.highlights.len(), 1);
        assert_eq!(analysis.questions[0].marks, 5);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_page_analysis("no json at all").is_none());
        assert!(parse_page_analysis("{\"highlights\": 3}").is_none());
    }

    #[test]
    fn custom_prompt_criteria_reach_the_model_verbatim() {
        let request = AnalysisRequest {
            document_id: "d1".to_string(),
            pages: vec![1],
            mode: AnalysisMode::CustomPrompt,
            custom_prompt: Some("Key Formulas ONLY".to_string()),
        };
        let prompt = build_page_prompt("body", &request, 100);
        // The key normalizes the prompt; the model sees it as written.
        assert!(prompt.contains("Key Formulas ONLY"));
    }

    #[test]
    fn page_budget_bounds_the_text() {
        let request = AnalysisRequest {
            document_id: "d1".to_string(),
            pages: vec![1],
            mode: AnalysisMode::AutoHighlight,
            custom_prompt: None,
        };
        let long = "x".repeat(10_000);
        let prompt = build_page_prompt(&long, &request, 500);
        assert!(prompt.len() < 2_000);
    }
}
