//! # Lectern
//!
//! A document Q&A and study-aid engine.
//!
//! Lectern ingests study documents (text, Markdown, PDF), chunks and embeds
//! them into a vector index, and answers natural-language questions over
//! the indexed content with source citations. The same index drives
//! page-by-page document analysis (with a TTL-bounded result cache so
//! repeated analyses never recompute) and structured question-set
//! generation (quizzes, theory, coding, reorder).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌────────────┐
//! │ Extractors│──▶│   Pipeline    │──▶│   Stores   │
//! │ txt/md/pdf│   │ Chunk + Embed │   │ SQLite/mem │
//! └───────────┘   └──────────────┘   └─────┬──────┘
//!                                          │
//!            ┌─────────────┬───────────────┤
//!            ▼             ▼               ▼
//!      ┌──────────┐  ┌───────────┐  ┌────────────┐
//!      │ Retrieve │  │  Analyze  │  │ Questions  │
//!      │ + Answer │  │ per page  │  │ quiz/test  │
//!      └──────────┘  └───────────┘  └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Caller-visible error taxonomy |
//! | [`extract`] | Per-format text extraction |
//! | [`chunk`] | Overlapping fixed-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`retrieve`] | Scoped top-k retrieval |
//! | [`context`] | Bounded context assembly with citations |
//! | [`completion`] | Generative-model completion client |
//! | [`answer`] | Grounded answer generation |
//! | [`cache`] | Content-addressed analysis cache with TTL |
//! | [`analyze`] | Page-by-page analysis with progress streaming |
//! | [`questions`] | Structured question-set generation |
//! | [`store`] | Storage traits, in-memory and SQLite backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod answer;
pub mod cache;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod questions;
pub mod retrieve;
pub mod store;
