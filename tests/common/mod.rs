//! Shared test doubles: a deterministic embedder and a scripted
//! completion client with call counting.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lectern::completion::CompletionClient;
use lectern::embedding::Embedder;
use lectern::error::Result;

/// Deterministic 8-dimensional embedder: character histogram by byte
/// residue. Similar texts map to similar vectors; identical texts map to
/// identical vectors.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-8"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = [0.0f32; 8];
                for b in t.bytes() {
                    v[(b % 8) as usize] += 1.0;
                }
                let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    v.iter_mut().for_each(|x| *x /= norm);
                }
                v.to_vec()
            })
            .collect())
    }
}

/// Completion client that replays a scripted sequence of replies
/// (`Ok(text)` or `Err(message)`), then falls back to `fallback` if set.
/// Counts every call.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<std::result::Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// A client that always answers `reply`.
    pub fn always(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => anyhow::bail!(message),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => anyhow::bail!("scripted completion exhausted"),
            },
        }
    }
}

/// A syntactically valid page-analysis reply.
pub const PAGE_ANALYSIS_JSON: &str = r#"{"highlights": [{"text": "key passage", "reason": "core definition"}], "questions": [{"question": "What is it?", "answer": "The thing.", "marks": 2}]}"#;
