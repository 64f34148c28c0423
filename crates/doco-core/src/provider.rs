//! Collaborator traits for text extraction and answer generation.
//!
//! Both are usually backed by the same generative-AI service, but the
//! pipeline treats them as separate seams so extraction can run locally
//! while generation stays remote (or the reverse, in tests).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::Document;

/// Converts an uploaded document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short identifier used in logs (e.g. `"gemini"`, `"local"`).
    fn name(&self) -> &str;

    async fn extract_text(&self, document: &Document) -> Result<String>;
}

/// One call to the answer generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub system_instruction: &'a str,
    /// Text part of the request. `None` sends the document alone.
    pub prompt: Option<&'a str>,
    /// Document sent inline alongside the prompt.
    pub document: Option<&'a Document>,
    /// JSON schema the response must follow.
    pub response_schema: &'a Value,
}

/// Produces structured JSON text from a prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the raw response text. Parsing is the caller's job.
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}
