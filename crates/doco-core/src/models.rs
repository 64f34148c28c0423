//! Core data models used throughout Doco.
//!
//! These types represent the uploaded documents, stored chunks, search hits
//! and analysis results that flow through the ingestion and query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded binary artifact. Transient: it lives for one ingest or
/// analyze call and is never persisted in full.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    /// Declared media type (e.g. `application/pdf`, `image/png`).
    pub media_type: String,
    /// Declared original file name, if the client sent one.
    pub name: Option<String>,
    /// Declared size in bytes. Defaults to `bytes.len()`.
    pub size: u64,
}

impl Document {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            media_type: media_type.into(),
            name: None,
            size,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_media_type(&self.media_type)
    }
}

/// Chunk handed to the store by the pipeline. The store stamps the
/// creation and expiry timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk as persisted by a [`ChunkStore`](crate::store::ChunkStore).
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Chunk {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A nearest-neighbor search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub index: i64,
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Structured answer produced by the answer generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub tone: String,
}

/// Coarse document category recorded in client history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Pdf,
    Docx,
    Csv,
    Text,
}

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_CSV: &str = "text/csv";

impl FileKind {
    pub fn from_media_type(media_type: &str) -> Self {
        let base = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match base.as_str() {
            MIME_PDF => FileKind::Pdf,
            MIME_DOCX => FileKind::Docx,
            MIME_CSV => FileKind::Csv,
            m if m.starts_with("image/") => FileKind::Image,
            _ => FileKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Csv => "csv",
            FileKind::Text => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_media_type() {
        assert_eq!(FileKind::from_media_type("application/pdf"), FileKind::Pdf);
        assert_eq!(FileKind::from_media_type("image/webp"), FileKind::Image);
        assert_eq!(FileKind::from_media_type("text/csv; charset=utf-8"), FileKind::Csv);
        assert_eq!(FileKind::from_media_type(MIME_DOCX), FileKind::Docx);
        assert_eq!(FileKind::from_media_type("text/plain"), FileKind::Text);
    }

    #[test]
    fn test_analysis_result_camel_case() {
        let json = r#"{"summary":"s","keyPoints":["a"],"actionItems":[],"tone":"Casual"}"#;
        let parsed: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.key_points, vec!["a"]);
        let out = serde_json::to_value(&parsed).unwrap();
        assert!(out.get("actionItems").is_some());
    }
}
