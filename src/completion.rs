//! Generative-model completion client.
//!
//! The model service is a black box with a single operation:
//! [`CompletionClient::complete`]. It is assumed unreliable — rate limits,
//! timeouts, transient errors — so every call carries a timeout and no
//! retries happen at this layer; callers apply their own bounded policies
//! (the question-set generator retries malformed output exactly once).

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Black-box completion service: prompt in, text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Client for OpenAI-compatible chat completions endpoints.
///
/// The API key is read from the environment variable named by
/// `generation.api_key_env`; when unset, no Authorization header is sent
/// (local inference servers).
pub struct HttpCompletionClient {
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpCompletionClient {
    pub fn new(config: &GenerationConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self {
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.7,
            "max_tokens": self.max_tokens,
        });

        let mut request = client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            anyhow::bail!("completion API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("invalid completion response: missing content"))?;

        Ok(content.to_string())
    }
}

/// Slice the first JSON object or array out of model output.
///
/// Models asked for "JSON only" still wrap replies in prose or code fences
/// often enough that callers strip down to the outermost `{...}`/`[...]`
/// before parsing.
pub fn extract_json(text: &str) -> Option<&str> {
    let obj = text.find('{').and_then(|start| {
        text.rfind('}')
            .filter(|&end| end > start)
            .map(|end| (start, end))
    });
    let arr = text.find('[').and_then(|start| {
        text.rfind(']')
            .filter(|&end| end > start)
            .map(|end| (start, end))
    });

    let (start, end) = match (obj, arr) {
        (Some(o), Some(a)) => {
            if a.0 < o.0 {
                a
            } else {
                o
            }
        }
        (Some(o), None) => o,
        (None, Some(a)) => a,
        (None, None) => return None,
    };

    text.get(start..=end)
}
