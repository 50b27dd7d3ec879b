use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum chunks returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Character budget for assembled prompt context.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_budget_chars: default_context_budget(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_context_budget() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_generation_url")]
    pub url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Environment variable holding the API key (empty value = no auth header).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// How many recent conversation turns accompany each question.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_generation_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "LECTERN_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_history_turns() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Validity window for cached page analyses.
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: i64,
    /// Character budget per page sent to the model.
    #[serde(default = "default_page_budget")]
    pub page_budget_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cache_ttl_days: default_cache_ttl_days(),
            page_budget_chars: default_page_budget(),
        }
    }
}

fn default_cache_ttl_days() -> i64 {
    30
}
fn default_page_budget() -> usize {
    4000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking — overlap must be strictly smaller than the window
    // or the chunker cannot make progress.
    if config.chunking.window_chars == 0 {
        anyhow::bail!("chunking.window_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.window_chars {
        anyhow::bail!(
            "chunking.overlap_chars ({}) must be < chunking.window_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.window_chars
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.context_budget_chars == 0 {
        anyhow::bail!("retrieval.context_budget_chars must be > 0");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Validate analysis
    if config.analysis.cache_ttl_days < 1 {
        anyhow::bail!("analysis.cache_ttl_days must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config("[db]\npath = \"data/test.sqlite\"\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.window_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.analysis.cache_ttl_days, 30);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let f = write_config(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nwindow_chars = 100\noverlap_chars = 100\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let f = write_config("[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(f.path()).is_err());
    }
}
