//! Caller-visible error taxonomy.
//!
//! Transient failures from stores, the vector index, or the model service
//! are caught at the component boundary that invoked them and translated
//! into one of these kinds. Raw transport errors never cross into callers.
//! A cache miss is not an error — it is the normal trigger for computation.

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The retrieval scope contains no documents. Callers must short-circuit
    /// before invoking the model service.
    #[error("no content available in the requested scope")]
    NoContentAvailable,

    /// The generative model call failed (timeout, transport error, or
    /// malformed structured output after the bounded retry).
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The embedding provider failed after its retries were exhausted.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A document store or vector index operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Text extraction failed; ingestion of that document is aborted.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Invalid configuration or parameters (e.g. overlap >= window).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Translate an internal error into [`Error::Storage`] at the
    /// component boundary.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }
}
