//! Content-addressed cache for per-page analysis results.
//!
//! Expensive AI computations (auto-highlights, per-page question
//! generation) are cached under a composite key of document id, page
//! number, analysis mode, and the custom prompt text, so identical
//! requests inside the validity window never recompute.
//!
//! # Key normalization
//!
//! Custom prompt text is normalized before hashing: leading/trailing
//! whitespace trimmed, lowercased, and internal whitespace runs collapsed
//! to a single space. Two prompts that differ only in case or spacing
//! therefore address the same entry. The rule is part of the cache's
//! contract — changing it invalidates every custom-prompt entry.
//!
//! # Expiry
//!
//! Entries are valid for a fixed window (default 30 days). Expiry is
//! logical and checked at read time: an entry past its window is reported
//! as absent whether or not [`AnalysisCache::purge_expired`] has removed
//! it physically. Concurrent writers to the same key are last-writer-wins;
//! values for an identical key are equivalent by construction.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::store::{CacheEntry, CacheStore};

/// What kind of analysis a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Model picks out the important passages on its own.
    AutoHighlight,
    /// User-supplied criteria steer the analysis.
    CustomPrompt,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::AutoHighlight => "auto",
            AnalysisMode::CustomPrompt => "custom",
        }
    }
}

/// Composite cache key: (document, page, mode, normalized prompt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub document_id: String,
    pub page: u32,
    pub mode: AnalysisMode,
    /// Normalized prompt text; empty for [`AnalysisMode::AutoHighlight`].
    pub prompt: String,
}

impl CacheKey {
    pub fn new(
        document_id: impl Into<String>,
        page: u32,
        mode: AnalysisMode,
        prompt: Option<&str>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            page,
            mode,
            prompt: prompt.map(normalize_prompt).unwrap_or_default(),
        }
    }

    /// Stable hex digest of the key. Fields are length-delimited before
    /// hashing so no two distinct keys can produce the same byte stream.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.document_id.as_str(),
            &self.page.to_string(),
            self.mode.as_str(),
            &self.prompt,
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Normalize custom-prompt text for key derivation: trim, lowercase,
/// collapse internal whitespace runs to single spaces.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// TTL-bounded, content-addressed store for analysis results.
pub struct AnalysisCache {
    store: Arc<dyn CacheStore>,
    ttl_secs: i64,
}

impl AnalysisCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_days: i64) -> Self {
        Self {
            store,
            ttl_secs: ttl_days * 24 * 60 * 60,
        }
    }

    /// Look up a cached value. Returns `None` on a miss, on logical
    /// expiry, or when a stored value no longer deserializes (treated as
    /// absent rather than an error).
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        self.get_at(key, chrono::Utc::now().timestamp()).await
    }

    /// [`get`](Self::get) with an explicit clock, for deterministic tests.
    pub async fn get_at<T: DeserializeOwned>(&self, key: &CacheKey, now: i64) -> Result<Option<T>> {
        let entry = self
            .store
            .get(&key.digest())
            .await
            .map_err(Error::storage)?;

        let entry = match entry {
            Some(e) => e,
            None => return Ok(None),
        };

        if now - entry.created_at > self.ttl_secs {
            return Ok(None);
        }

        match serde_json::from_str(&entry.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("discarding undecodable cache entry {}: {}", entry.key, e);
                Ok(None)
            }
        }
    }

    /// Store a value under the key, stamped with the current time.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        self.put_at(key, value, chrono::Utc::now().timestamp()).await
    }

    /// [`put`](Self::put) with an explicit write timestamp.
    pub async fn put_at<T: Serialize>(&self, key: &CacheKey, value: &T, now: i64) -> Result<()> {
        let entry = CacheEntry {
            key: key.digest(),
            document_id: key.document_id.clone(),
            value: serde_json::to_string(value).map_err(Error::storage)?,
            created_at: now,
        };
        self.store.put(&entry).await.map_err(Error::storage)
    }

    /// Physically remove entries past the validity window. Correctness of
    /// [`get`](Self::get) never depends on this running.
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp() - self.ttl_secs;
        self.store.purge_expired(cutoff).await.map_err(Error::storage)
    }

    /// Drop all entries for a document (cascade on document deletion).
    pub async fn invalidate_document(&self, document_id: &str) -> Result<()> {
        self.store
            .delete_document(document_id)
            .await
            .map_err(Error::storage)
    }
}
