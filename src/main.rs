//! # Lectern CLI (`lct`)
//!
//! The `lct` binary is the primary interface for Lectern. It provides
//! commands for database initialization, document ingestion, question
//! answering, page-by-page analysis, and question-set generation.
//!
//! ## Usage
//!
//! ```bash
//! lct --config ./config/lectern.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lct init` | Create the SQLite database and run schema migrations |
//! | `lct ingest <path>` | Ingest a file or directory into a notebook |
//! | `lct ask "<question>"` | Answer a question over a notebook's documents |
//! | `lct analyze <doc-id>` | Analyze a document page by page, streaming progress |
//! | `lct questions` | Generate a structured question set (quiz, theory, ...) |
//! | `lct history` | Show a notebook's recent conversation |
//! | `lct delete <doc-id>` | Delete a document and everything derived from it |
//! | `lct purge-cache` | Physically remove expired analysis-cache entries |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lectern::analyze::{AnalysisEvent, AnalysisRequest, PageAnalyzer, PageStatus};
use lectern::answer::AnswerGenerator;
use lectern::cache::{AnalysisCache, AnalysisMode};
use lectern::completion::HttpCompletionClient;
use lectern::config::{load_config, Config};
use lectern::context;
use lectern::embedding::create_embedder;
use lectern::extract::extract_file;
use lectern::ingest::Ingestor;
use lectern::models::{ConversationTurn, Role, ScopeFilter};
use lectern::questions::{
    Difficulty, QuestionFormat, QuestionSetGenerator, QuestionSetSpec,
};
use lectern::retrieve::Retriever;
use lectern::store::sqlite::SqliteStore;
use lectern::store::DocumentStore;
use lectern::{db, migrate};

/// Lectern — a document Q&A and study-aid engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with database, chunking, embedding, retrieval, generation, and
/// analysis settings.
#[derive(Parser)]
#[command(
    name = "lct",
    about = "Lectern — document Q&A, page analysis, and question generation over your study material",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lectern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent.
    Init,

    /// Ingest a file or directory into a notebook.
    ///
    /// Supported formats: .txt, .md, .pdf. Each file is extracted, chunked,
    /// embedded, and indexed. Requires an embedding provider in config.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Notebook to ingest into.
        #[arg(long, default_value = "default")]
        notebook: String,
    },

    /// Ask a question over a notebook's documents.
    Ask {
        /// The question.
        question: String,

        /// Notebook to search.
        #[arg(long, default_value = "default")]
        notebook: String,

        /// Restrict to specific document ids (comma-separated).
        #[arg(long, value_delimiter = ',')]
        documents: Option<Vec<String>>,
    },

    /// Analyze a document page by page, streaming progress.
    ///
    /// Results are cached per (document, page, mode, prompt); re-running
    /// within the validity window reuses cached pages without model calls.
    Analyze {
        /// Document id to analyze.
        document: String,

        /// Pages to analyze (comma-separated, 1-based). Default: all.
        #[arg(long, value_delimiter = ',')]
        pages: Option<Vec<u32>>,

        /// Custom analysis criteria. Default: auto-highlight.
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Generate a structured question set from a notebook's content.
    Questions {
        /// Notebook to draw content from.
        #[arg(long, default_value = "default")]
        notebook: String,

        /// Number of questions.
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Difficulty: easy, medium, or hard.
        #[arg(long, default_value = "medium")]
        difficulty: String,

        /// Format: multiple_choice, theory, coding, or reorder.
        #[arg(long, default_value = "multiple_choice")]
        format: String,

        /// Mark buckets for theory sets (comma-separated, e.g. 2,5,10).
        #[arg(long, value_delimiter = ',')]
        marks: Option<Vec<u32>>,

        /// Programming language for coding questions.
        #[arg(long)]
        language: Option<String>,
    },

    /// Show a notebook's recent conversation turns.
    History {
        #[arg(long, default_value = "default")]
        notebook: String,

        /// Number of turns to show.
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete a document, its chunks, vectors, and cached analyses.
    Delete {
        /// Document id to delete.
        document: String,
    },

    /// Physically remove expired analysis-cache entries.
    PurgeCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { path, notebook } => run_ingest(&config, &path, &notebook).await,
        Commands::Ask {
            question,
            notebook,
            documents,
        } => run_ask(&config, &question, &notebook, documents).await,
        Commands::Analyze {
            document,
            pages,
            prompt,
        } => run_analyze(&config, &document, pages.unwrap_or_default(), prompt).await,
        Commands::Questions {
            notebook,
            count,
            difficulty,
            format,
            marks,
            language,
        } => run_questions(&config, &notebook, count, &difficulty, &format, marks, language).await,
        Commands::History { notebook, limit } => run_history(&config, &notebook, limit).await,
        Commands::Delete { document } => run_delete(&config, &document).await,
        Commands::PurgeCache => run_purge_cache(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

async fn run_init(config: &Config) -> Result<()> {
    open_store(config).await?;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_ingest(config: &Config, path: &Path, notebook: &str) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)
        .context("ingest requires an embedding provider; set [embedding] in config")?;
    let cache = Arc::new(AnalysisCache::new(
        store.clone(),
        config.analysis.cache_ttl_days,
    ));
    let ingestor = Ingestor::new(
        store.clone(),
        store.clone(),
        embedder,
        cache,
        config.chunking.clone(),
        config.embedding.batch_size,
    );

    let files = collect_files(path)?;
    if files.is_empty() {
        bail!("no ingestable files under {}", path.display());
    }

    let mut ingested = 0usize;
    let mut chunks_total = 0usize;
    let mut skipped = 0usize;

    for file in &files {
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();

        let (format, extracted) = match extract_file(file) {
            Ok(ok) => ok,
            Err(e) => {
                log::warn!("skipping {}: {}", file.display(), e);
                skipped += 1;
                continue;
            }
        };

        let outcome = ingestor
            .ingest(notebook, &filename, format, extracted)
            .await?;
        println!(
            "  {} -> {} ({} chunks)",
            filename, outcome.document_id, outcome.chunk_count
        );
        ingested += 1;
        chunks_total += outcome.chunk_count;
    }

    println!("ingest {}", path.display());
    println!("  documents: {}", ingested);
    println!("  chunks: {}", chunks_total);
    if skipped > 0 {
        println!("  skipped: {}", skipped);
    }
    println!("ok");
    Ok(())
}

fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("path does not exist: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file()
            && lectern::extract::format_for_path(entry.path()).is_some()
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

async fn run_ask(
    config: &Config,
    question: &str,
    notebook: &str,
    documents: Option<Vec<String>>,
) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)
        .context("ask requires an embedding provider; set [embedding] in config")?;
    let retriever = Retriever::new(embedder, store.clone(), store.clone());
    let client = Arc::new(HttpCompletionClient::new(&config.generation));
    let generator = AnswerGenerator::new(client, config.generation.history_turns);

    let scope = ScopeFilter {
        notebook_id: notebook.to_string(),
        document_ids: documents,
    };

    let results = retriever
        .retrieve(question, &scope, config.retrieval.top_k)
        .await?;
    if results.is_empty() {
        println!("I couldn't find any relevant information in the uploaded documents.");
        return Ok(());
    }
    let (context_text, citations) =
        context::assemble(&results, config.retrieval.context_budget_chars);

    let history = store
        .recent_turns(notebook, config.generation.history_turns)
        .await?;

    let now = chrono::Utc::now().timestamp();
    store
        .append_turn(
            notebook,
            &ConversationTurn {
                role: Role::User,
                text: question.to_string(),
                citations: Vec::new(),
                created_at: now,
            },
        )
        .await?;

    let result = generator
        .answer_or_fallback(question, &context_text, citations, &history)
        .await;

    store
        .append_turn(
            notebook,
            &ConversationTurn {
                role: Role::Assistant,
                text: result.text.clone(),
                citations: result.citations.clone(),
                created_at: chrono::Utc::now().timestamp(),
            },
        )
        .await?;

    println!("{}", result.text);
    if !result.citations.is_empty() {
        println!();
        println!("sources:");
        for c in &result.citations {
            match c.page {
                Some(page) => println!(
                    "  {} p.{} #{} [{:.2}]",
                    c.filename, page, c.chunk_index, c.score
                ),
                None => println!("  {} #{} [{:.2}]", c.filename, c.chunk_index, c.score),
            }
        }
    }
    Ok(())
}

async fn run_analyze(
    config: &Config,
    document: &str,
    pages: Vec<u32>,
    prompt: Option<String>,
) -> Result<()> {
    let store = open_store(config).await?;
    let cache = Arc::new(AnalysisCache::new(
        store.clone(),
        config.analysis.cache_ttl_days,
    ));
    let client = Arc::new(HttpCompletionClient::new(&config.generation));
    let analyzer = PageAnalyzer::new(
        store,
        cache,
        client,
        config.analysis.page_budget_chars,
    );

    let mode = if prompt.is_some() {
        AnalysisMode::CustomPrompt
    } else {
        AnalysisMode::AutoHighlight
    };

    let (_handle, mut rx) = analyzer.stream(AnalysisRequest {
        document_id: document.to_string(),
        pages,
        mode,
        custom_prompt: prompt,
    });

    while let Some(event) = rx.recv().await {
        match event {
            AnalysisEvent::Page {
                page,
                status,
                analysis,
            } => {
                let tag = match status {
                    PageStatus::Cached => "cached",
                    PageStatus::Computed => "computed",
                    PageStatus::Failed => "failed",
                };
                println!("page {} [{}]", page, tag);
                if let Some(a) = analysis {
                    for h in &a.highlights {
                        println!("  * {}", h.text);
                    }
                    for q in &a.questions {
                        println!("  ? [{}] {}", q.marks, q.question);
                    }
                }
            }
            AnalysisEvent::Progress { done, total } => {
                eprintln!("progress {}/{}", done, total);
            }
            AnalysisEvent::Finished {
                computed,
                cached,
                failed,
            } => {
                println!(
                    "done: {} computed, {} cached, {} failed",
                    computed, cached, failed
                );
            }
            AnalysisEvent::Failed { error } => bail!("analysis failed: {}", error),
            AnalysisEvent::Cancelled { done, total } => {
                println!("cancelled after {}/{}", done, total);
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_questions(
    config: &Config,
    notebook: &str,
    count: usize,
    difficulty: &str,
    format: &str,
    marks: Option<Vec<u32>>,
    language: Option<String>,
) -> Result<()> {
    let difficulty = match difficulty {
        "easy" => Difficulty::Easy,
        "medium" => Difficulty::Medium,
        "hard" => Difficulty::Hard,
        other => bail!("unknown difficulty: {}. Use easy, medium, or hard.", other),
    };
    let format = match format {
        "multiple_choice" => QuestionFormat::MultipleChoice,
        "theory" => QuestionFormat::Theory,
        "coding" => QuestionFormat::Coding,
        "reorder" => QuestionFormat::Reorder,
        other => bail!(
            "unknown format: {}. Use multiple_choice, theory, coding, or reorder.",
            other
        ),
    };

    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)
        .context("questions requires an embedding provider; set [embedding] in config")?;
    let retriever = Arc::new(Retriever::new(embedder, store.clone(), store.clone()));
    let client = Arc::new(HttpCompletionClient::new(&config.generation));
    let generator = QuestionSetGenerator::new(retriever, client, store);

    let spec = QuestionSetSpec {
        count,
        difficulty,
        format,
        mark_buckets: marks,
        programming_language: language,
    };

    let set = generator
        .generate(&ScopeFilter::notebook(notebook), &spec)
        .await?;

    println!("question set {}", set.id);
    println!("{}", serde_json::to_string_pretty(&set.questions)?);
    Ok(())
}

async fn run_history(config: &Config, notebook: &str, limit: usize) -> Result<()> {
    let store = open_store(config).await?;
    let turns = store.recent_turns(notebook, limit).await?;

    if turns.is_empty() {
        println!("no conversation yet in {}", notebook);
        return Ok(());
    }

    for turn in turns {
        println!("[{}] {}", turn.role.as_str(), turn.text);
    }
    Ok(())
}

async fn run_delete(config: &Config, document: &str) -> Result<()> {
    let store = open_store(config).await?;
    let cache = AnalysisCache::new(store.clone(), config.analysis.cache_ttl_days);

    lectern::ingest::delete_document(store.as_ref(), store.as_ref(), &cache, document).await?;

    println!("deleted {}", document);
    Ok(())
}

async fn run_purge_cache(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let cache = AnalysisCache::new(store, config.analysis.cache_ttl_days);
    let purged = cache.purge_expired().await?;
    println!("purged {} expired cache entries", purged);
    Ok(())
}
