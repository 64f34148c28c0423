//! Gemini REST adapters.
//!
//! [`GeminiClient`] is the shared transport: base URL, API key, timeout and
//! retry policy. Three thin adapters sit on top of it:
//!
//! - [`GeminiExtractor`]: `generateContent` with the document inline and an
//!   `{ extractedText }` response schema.
//! - [`GeminiEmbedder`]: `batchEmbedContents` for document chunks
//!   (`RETRIEVAL_DOCUMENT`), `embedContent` for queries (`RETRIEVAL_QUERY`).
//! - [`GeminiGenerator`]: `generateContent` with a system instruction and
//!   the analysis response schema.
//!
//! # Retry Strategy
//!
//! With `max_retries > 0`, HTTP 429, 5xx and network errors are retried
//! with exponential backoff (1s, 2s, 4s, ... capped at 32s). Other 4xx
//! responses fail immediately. The default is no retry.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use doco_core::embedding::{Embedder, EmbeddingPurpose};
use doco_core::models::Document;
use doco_core::pipeline::strip_code_fence;
use doco_core::prompt::{extraction_schema, EXTRACTION_INSTRUCTION};
use doco_core::provider::{AnswerGenerator, GenerationRequest, TextExtractor};

use crate::config::{Config, GeminiConfig};
use crate::embedding::float_array;

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_EMBEDDING_DIMS: usize = 768;

/// Title attached to every document chunk embedding request.
const CHUNK_TITLE: &str = "Document Chunk";

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries,
        })
    }

    pub fn from_config(config: &GeminiConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.resolve_api_key()?,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    /// `POST {base}/models/{model}:{method}` with retry.
    async fn call(&self, model: &str, method: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/models/{}:{}", self.base_url, model, method);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(method, attempt, ?delay, "retrying Gemini request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .with_context(|| format!("Invalid JSON from Gemini {}", method));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = anyhow!(
                        "Gemini API error {} on {}: {}",
                        status,
                        method,
                        error_message(&body_text)
                    );
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(anyhow!("Gemini request failed on {}: {}", method, e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Gemini {} failed after retries", method)))
    }

    /// Run `generateContent` and return the concatenated text parts of the
    /// first candidate.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerationRequest<'_>,
    ) -> Result<String> {
        let body = content_request(request);
        let json = self.call(model, "generateContent", &body).await?;
        response_text(&json)
    }
}

/// Pull `error.message` out of a Gemini error body, or return it as is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Build a `generateContent` body. The inline document, when present,
/// precedes the text part.
pub fn content_request(request: &GenerationRequest<'_>) -> Value {
    let mut parts = Vec::new();
    if let Some(doc) = request.document {
        parts.push(json!({
            "inlineData": {
                "mimeType": doc.media_type,
                "data": base64::engine::general_purpose::STANDARD.encode(&doc.bytes),
            }
        }));
    }
    if let Some(prompt) = request.prompt {
        parts.push(json!({ "text": prompt }));
    }

    json!({
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.response_schema,
        }
    })
}

fn response_text(json: &Value) -> Result<String> {
    if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
        bail!("Gemini blocked the request: {}", reason);
    }
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| anyhow!("No response from Gemini: missing candidates"))?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        bail!("No response from Gemini: empty text");
    }
    Ok(text)
}

// ============ Extraction ============

pub struct GeminiExtractor {
    client: GeminiClient,
    model: String,
}

impl GeminiExtractor {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct ExtractedText {
    #[serde(rename = "extractedText")]
    extracted_text: String,
}

#[async_trait]
impl TextExtractor for GeminiExtractor {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn extract_text(&self, document: &Document) -> Result<String> {
        let schema = extraction_schema();
        let request = GenerationRequest {
            system_instruction: EXTRACTION_INSTRUCTION,
            prompt: None,
            document: Some(document),
            response_schema: &schema,
        };
        let raw = self.client.generate_content(&self.model, &request).await?;
        let parsed: ExtractedText = serde_json::from_str(strip_code_fence(&raw))
            .context("Extraction response is missing extractedText")?;
        debug!(chars = parsed.extracted_text.len(), "gemini extraction done");
        Ok(parsed.extracted_text)
    }
}

// ============ Embedding ============

pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl GeminiEmbedder {
    pub fn new(
        client: GeminiClient,
        model: impl Into<String>,
        dims: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            dims,
            batch_size: batch_size.max(1),
        }
    }

    fn task_type(purpose: EmbeddingPurpose) -> &'static str {
        match purpose {
            EmbeddingPurpose::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingPurpose::Query => "RETRIEVAL_QUERY",
        }
    }

    fn content_entry(&self, text: &str, purpose: EmbeddingPurpose) -> Value {
        let mut entry = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": Self::task_type(purpose),
        });
        if purpose == EmbeddingPurpose::Document {
            entry["title"] = json!(CHUNK_TITLE);
        }
        entry
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            purpose = purpose.as_str(),
            texts = texts.len(),
            model = %self.model,
            "gemini embedding"
        );

        if purpose == EmbeddingPurpose::Query && texts.len() == 1 {
            let body = self.content_entry(&texts[0], purpose);
            let json = self.client.call(&self.model, "embedContent", &body).await?;
            return Ok(vec![parse_values(&json["embedding"])?]);
        }

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let requests: Vec<Value> = batch
                .iter()
                .map(|t| self.content_entry(t, purpose))
                .collect();
            let json = self
                .client
                .call(&self.model, "batchEmbedContents", &json!({ "requests": requests }))
                .await?;
            let embeddings = json["embeddings"]
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Gemini response: missing embeddings array"))?;
            for e in embeddings {
                out.push(parse_values(e)?);
            }
        }
        Ok(out)
    }
}

fn parse_values(embedding: &Value) -> Result<Vec<f32>> {
    float_array(&embedding["values"], "Gemini")
}

// ============ Generation ============

pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
}

impl GeminiGenerator {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        self.client.generate_content(&self.model, request).await
    }
}

/// Embedder built from `[embedding]` + `[gemini]`.
pub fn embedder_from_config(config: &Config) -> Result<GeminiEmbedder> {
    let client = GeminiClient::from_config(&config.gemini)?;
    let model = config
        .embedding
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
    let dims = config.embedding.dims.unwrap_or(DEFAULT_EMBEDDING_DIMS);
    Ok(GeminiEmbedder::new(
        client,
        model,
        dims,
        config.embedding.batch_size,
    ))
}
