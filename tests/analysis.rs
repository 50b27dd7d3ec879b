//! Page-analysis pipeline tests: cache hits and expiry, progress ordering,
//! partial-failure tolerance, and cooperative cancellation.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{ScriptedCompletion, PAGE_ANALYSIS_JSON};
use lectern::analyze::{
    AnalysisEvent, AnalysisRequest, JobHandle, PageAnalyzer, PageStatus,
};
use lectern::cache::{AnalysisCache, AnalysisMode, CacheKey};
use lectern::completion::CompletionClient;
use lectern::models::{Document, DocumentFormat};
use lectern::store::memory::MemoryStore;
use lectern::store::DocumentStore;

/// Build a document whose pages are each one line of text.
fn paged_document(id: &str, pages: usize) -> Document {
    let mut body = String::new();
    let mut page_offsets = Vec::new();
    for i in 1..=pages {
        page_offsets.push(body.len());
        body.push_str(&format!("Content of page {} with enough words to analyze.\n", i));
    }
    Document {
        id: id.to_string(),
        notebook_id: "n1".to_string(),
        filename: format!("{}.pdf", id),
        format: DocumentFormat::Pdf,
        body,
        page_offsets,
        created_at: 0,
    }
}

async fn setup(
    pages: usize,
    client: Arc<dyn CompletionClient>,
) -> (Arc<MemoryStore>, Arc<AnalysisCache>, PageAnalyzer) {
    let store = Arc::new(MemoryStore::new());
    store.put_document(&paged_document("d1", pages)).await.unwrap();
    let cache = Arc::new(AnalysisCache::new(store.clone(), 30));
    let analyzer = PageAnalyzer::new(store.clone(), cache.clone(), client, 4000);
    (store, cache, analyzer)
}

fn auto_request() -> AnalysisRequest {
    AnalysisRequest {
        document_id: "d1".to_string(),
        pages: Vec::new(),
        mode: AnalysisMode::AutoHighlight,
        custom_prompt: None,
    }
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<AnalysisEvent>) -> Vec<AnalysisEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn five_pages_with_two_cached_makes_exactly_three_model_calls() {
    let client = ScriptedCompletion::always(PAGE_ANALYSIS_JSON);
    let (_store, cache, analyzer) = setup(5, client.clone()).await;

    // Pages 2 and 4 are already cached.
    for page in [2u32, 4] {
        let key = CacheKey::new("d1", page, AnalysisMode::AutoHighlight, None);
        cache
            .put(&key, &serde_json::from_str::<serde_json::Value>(PAGE_ANALYSIS_JSON).unwrap())
            .await
            .unwrap();
    }

    let (_handle, rx) = analyzer.stream(auto_request());
    let events = collect(rx).await;

    assert_eq!(client.calls(), 3);

    // Five page events, in page order, with the right statuses.
    let page_events: Vec<(u32, PageStatus)> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::Page { page, status, .. } => Some((*page, *status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        page_events,
        vec![
            (1, PageStatus::Computed),
            (2, PageStatus::Cached),
            (3, PageStatus::Computed),
            (4, PageStatus::Cached),
            (5, PageStatus::Computed),
        ]
    );

    // Five progress events in order.
    let progress: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::Progress { done, total } => Some((*done, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);

    // Terminal event reports completion.
    match events.last().unwrap() {
        AnalysisEvent::Finished {
            computed,
            cached,
            failed,
        } => {
            assert_eq!((*computed, *cached, *failed), (3, 2, 0));
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }
}

#[tokio::test]
async fn identical_request_within_window_issues_zero_additional_calls() {
    let client = ScriptedCompletion::always(PAGE_ANALYSIS_JSON);
    let (_store, _cache, analyzer) = setup(3, client.clone()).await;

    let (_h1, rx1) = analyzer.stream(auto_request());
    let first = collect(rx1).await;
    assert_eq!(client.calls(), 3);

    let (_h2, rx2) = analyzer.stream(auto_request());
    let second = collect(rx2).await;
    assert_eq!(client.calls(), 3, "second run must be fully cached");

    // Cached output equals the originally computed output.
    let analyses = |events: &[AnalysisEvent]| {
        events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::Page { analysis, .. } => analysis.clone(),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(analyses(&first), analyses(&second));
}

#[tokio::test]
async fn expired_entry_triggers_exactly_one_new_call() {
    let client = ScriptedCompletion::always(PAGE_ANALYSIS_JSON);
    let (_store, cache, analyzer) = setup(1, client.clone()).await;

    // Seed an entry written 31 days ago: logically expired.
    let key = CacheKey::new("d1", 1, AnalysisMode::AutoHighlight, None);
    let thirty_one_days = 31 * 24 * 60 * 60;
    cache
        .put_at(
            &key,
            &serde_json::from_str::<serde_json::Value>(PAGE_ANALYSIS_JSON).unwrap(),
            chrono::Utc::now().timestamp() - thirty_one_days,
        )
        .await
        .unwrap();

    let (_handle, rx) = analyzer.stream(auto_request());
    let events = collect(rx).await;

    assert_eq!(client.calls(), 1);
    assert!(matches!(
        events.first(),
        Some(AnalysisEvent::Page {
            status: PageStatus::Computed,
            ..
        })
    ));
}

#[tokio::test]
async fn custom_prompts_differing_only_in_whitespace_share_a_cache_entry() {
    let client = ScriptedCompletion::always(PAGE_ANALYSIS_JSON);
    let (_store, _cache, analyzer) = setup(1, client.clone()).await;

    let request = |prompt: &str| AnalysisRequest {
        document_id: "d1".to_string(),
        pages: vec![1],
        mode: AnalysisMode::CustomPrompt,
        custom_prompt: Some(prompt.to_string()),
    };

    let (_h1, rx1) = analyzer.stream(request("Key Formulas"));
    collect(rx1).await;
    assert_eq!(client.calls(), 1);

    let (_h2, rx2) = analyzer.stream(request("  key   FORMULAS "));
    collect(rx2).await;
    assert_eq!(client.calls(), 1, "normalized prompt must hit the cache");

    let (_h3, rx3) = analyzer.stream(request("different criteria"));
    collect(rx3).await;
    assert_eq!(client.calls(), 2, "different prompt must miss");
}

#[tokio::test]
async fn one_failing_page_does_not_abort_the_job() {
    let client = ScriptedCompletion::new(vec![
        Ok(PAGE_ANALYSIS_JSON.to_string()),
        Err("model timeout".to_string()),
        Ok(PAGE_ANALYSIS_JSON.to_string()),
    ]);
    let (_store, _cache, analyzer) = setup(3, client.clone()).await;

    let (_handle, rx) = analyzer.stream(auto_request());
    let events = collect(rx).await;

    let statuses: Vec<PageStatus> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::Page { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![PageStatus::Computed, PageStatus::Failed, PageStatus::Computed]
    );

    match events.last().unwrap() {
        AnalysisEvent::Finished {
            computed,
            cached,
            failed,
        } => assert_eq!((*computed, *cached, *failed), (2, 0, 1)),
        other => panic!("unexpected terminal event: {:?}", other),
    }
}

/// Completion wrapper that cancels the job handle once `cancel_after`
/// calls have completed.
struct CancelAfter {
    inner: Arc<ScriptedCompletion>,
    cancel_after: usize,
    handle: Mutex<Option<JobHandle>>,
}

#[async_trait]
impl CompletionClient for CancelAfter {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let result = self.inner.complete(prompt).await;
        if self.inner.calls() >= self.cancel_after {
            if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                handle.cancel();
            }
        }
        result
    }
}

#[tokio::test]
async fn cancelling_after_page_three_stops_further_model_calls() {
    let scripted = ScriptedCompletion::always(PAGE_ANALYSIS_JSON);
    let cancelling = Arc::new(CancelAfter {
        inner: scripted.clone(),
        cancel_after: 3,
        handle: Mutex::new(None),
    });

    let (_store, cache, analyzer) = setup(5, cancelling.clone()).await;

    let (handle, rx) = analyzer.stream(auto_request());
    *cancelling.handle.lock().unwrap() = Some(handle);

    let events = collect(rx).await;

    // Pages 1-3 ran; pages 4 and 5 never reached the model.
    assert_eq!(scripted.calls(), 3);

    let pages_seen: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::Page { page, .. } => Some(*page),
            _ => None,
        })
        .collect();
    assert_eq!(pages_seen, vec![1, 2, 3]);

    match events.last().unwrap() {
        AnalysisEvent::Cancelled { done, total } => assert_eq!((*done, *total), (3, 5)),
        other => panic!("unexpected terminal event: {:?}", other),
    }

    // Already-committed cache entries survive the cancellation.
    for page in [1u32, 2, 3] {
        let key = CacheKey::new("d1", page, AnalysisMode::AutoHighlight, None);
        let cached: Option<serde_json::Value> = cache.get(&key).await.unwrap();
        assert!(cached.is_some(), "page {} entry must remain valid", page);
    }
    for page in [4u32, 5] {
        let key = CacheKey::new("d1", page, AnalysisMode::AutoHighlight, None);
        let cached: Option<serde_json::Value> = cache.get(&key).await.unwrap();
        assert!(cached.is_none(), "page {} was never computed", page);
    }
}

#[tokio::test]
async fn dropping_the_receiver_stops_the_producer() {
    let client = ScriptedCompletion::always(PAGE_ANALYSIS_JSON);
    let (_store, _cache, analyzer) = setup(5, client.clone()).await;

    let (_handle, rx) = analyzer.stream(auto_request());
    drop(rx);

    // Single-threaded test runtime: the producer task only runs when we
    // yield, and sees the closed channel at its first between-pages check.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn unknown_document_fails_the_job_up_front() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(AnalysisCache::new(store.clone(), 30));
    let client = ScriptedCompletion::always(PAGE_ANALYSIS_JSON);
    let analyzer = PageAnalyzer::new(store, cache, client.clone(), 4000);

    let (_handle, rx) = analyzer.stream(AnalysisRequest {
        document_id: "missing".to_string(),
        pages: Vec::new(),
        mode: AnalysisMode::AutoHighlight,
        custom_prompt: None,
    });
    let events = collect(rx).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], AnalysisEvent::Failed { .. }));
    assert_eq!(client.calls(), 0);
}
