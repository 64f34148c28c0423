//! Embedder selection and the non-Gemini embedding backends.
//!
//! [`create_embedder`] reads `[embedding].provider`:
//!
//! | Value | Embedder |
//! |-------|----------|
//! | `"gemini"` | [`GeminiEmbedder`](crate::gemini::GeminiEmbedder) (task types per purpose) |
//! | `"openai"` | [`OpenAIEmbedder`] |
//! | `"ollama"` | [`OllamaEmbedder`] |
//! | `"local"` | `LocalEmbedder` (fastembed; `local-embeddings-fastembed` feature) |
//! | `"disabled"` | [`DisabledEmbedder`] |
//!
//! OpenAI, Ollama and fastembed have no notion of a task type. They encode
//! [`EmbeddingPurpose`] by prepending `query_prefix` / `document_prefix`
//! when configured (e.g. `"search_query: "` for nomic models), and embed
//! the text unchanged otherwise.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use doco_core::embedding::{Embedder, EmbeddingPurpose};

use crate::config::{Config, EmbeddingConfig};

pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let emb = &config.embedding;
    match emb.provider.as_str() {
        "gemini" => Ok(Arc::new(crate::gemini::embedder_from_config(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(emb)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(emb)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(emb))),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Apply the configured purpose prefix.
fn with_purpose(
    config: &EmbeddingConfig,
    texts: &[String],
    purpose: EmbeddingPurpose,
) -> Vec<String> {
    let prefix = match purpose {
        EmbeddingPurpose::Query => config.query_prefix.as_deref(),
        EmbeddingPurpose::Document => config.document_prefix.as_deref(),
    };
    match prefix {
        Some(p) => texts.iter().map(|t| format!("{}{}", p, t)).collect(),
        None => texts.to_vec(),
    }
}

// ============ Disabled ============

/// `provider = "disabled"`: every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String], _purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Shared HTTP retry ============

/// POST `body` to `url`, retrying 429/5xx/network errors `max_retries`
/// times with exponential backoff.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    service: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!(service, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }
                let body_text = response.text().await.unwrap_or_default();
                let err = anyhow!("{} API error {}: {}", service, status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", service, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", service)))
}

/// Parse a JSON array of numbers. Any non-numeric entry is an error.
pub(crate) fn float_array(value: &Value, what: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                anyhow!("Invalid {} response: embedding value {} is not a number", what, i)
            })
        })
        .collect()
}

// ============ OpenAI ============

/// `POST https://api.openai.com/v1/embeddings`. Needs `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    config: EmbeddingConfig,
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            model,
            dims,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>> {
        let input = with_purpose(&self.config, texts, purpose);
        let mut out = Vec::with_capacity(input.len());
        for batch in input.chunks(self.config.batch_size.max(1)) {
            let body = serde_json::json!({ "model": self.model, "input": batch });
            let json = post_with_retry(
                &self.client,
                "https://api.openai.com/v1/embeddings",
                Some(&self.api_key),
                &body,
                self.config.max_retries,
                "OpenAI",
            )
            .await?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

/// `data[]` may come back in any order; `index` restores input order.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json["data"]
        .as_array()
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
        indexed.push((index, float_array(&item["embedding"], "OpenAI")?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// `POST {url}/api/embed` on a local Ollama (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    config: EmbeddingConfig,
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>> {
        let input = with_purpose(&self.config, texts, purpose);
        let body = serde_json::json!({ "model": self.model, "input": input });
        let json = post_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.config.max_retries,
            "Ollama",
        )
        .await?;

        json["embeddings"]
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
            .iter()
            .map(|e| float_array(e, "Ollama"))
            .collect()
    }
}

// ============ Local (fastembed) ============

/// Runs a fastembed model in process. The model is downloaded from
/// Hugging Face on first use and cached.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    config: EmbeddingConfig,
    model: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let dims = config.dims.unwrap_or(match model.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            _ => 384,
        });
        Self {
            config: config.clone(),
            model,
            dims,
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>> {
        let model = fastembed_model(&self.model)?;
        let batch_size = self.config.batch_size;
        let input = with_purpose(&self.config, texts, purpose);

        tokio::task::spawn_blocking(move || {
            let mut embedder = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(false),
            )
            .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
            embedder
                .embed(input, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}
