//! Builds the pipeline's collaborators from configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use doco_core::provider::{AnswerGenerator, TextExtractor};
use doco_core::store::{ChunkStore, VectorSearchParams};
use doco_core::{Document, Pipeline, PipelineParams};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::LocalExtractor;
use crate::gemini::{GeminiClient, GeminiExtractor, GeminiGenerator};
use crate::sqlite_store::SqliteChunkStore;

pub fn pipeline_params(config: &Config) -> PipelineParams {
    PipelineParams {
        chunk_size: config.chunking.size,
        chunk_overlap: config.chunking.overlap,
        search: VectorSearchParams {
            num_candidates: config.retrieval.num_candidates,
            limit: config.retrieval.top_k,
        },
    }
}

pub fn build_extractor(config: &Config) -> Result<Arc<dyn TextExtractor>> {
    match config.extraction.provider.as_str() {
        "local" => Ok(Arc::new(LocalExtractor)),
        _ => {
            let client = GeminiClient::from_config(&config.gemini)?;
            Ok(Arc::new(GeminiExtractor::new(
                client,
                config.extraction.model.clone(),
            )))
        }
    }
}

pub fn build_generator(config: &Config) -> Result<Arc<dyn AnswerGenerator>> {
    let client = GeminiClient::from_config(&config.gemini)?;
    Ok(Arc::new(GeminiGenerator::new(
        client,
        config.generation.model.clone(),
    )))
}

/// Full pipeline over the SQLite store. Creates the schema if needed.
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::open(config).await?);
    Ok(Pipeline::new(
        build_extractor(config)?,
        create_embedder(config)?,
        store,
        build_generator(config)?,
        pipeline_params(config),
    ))
}

/// Media type from a file extension. Unknown extensions fall back to
/// `application/octet-stream`.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "csv" => "text/csv",
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Read a file from disk into a [`Document`].
pub fn read_document(path: &Path, media_type: Option<&str>) -> Result<Document> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let media_type = media_type
        .map(str::to_string)
        .unwrap_or_else(|| media_type_for_path(path).to_string());
    let mut doc = Document::new(bytes, media_type);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        doc = doc.with_name(name);
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_for_path() {
        assert_eq!(media_type_for_path(Path::new("a/Report.PDF")), "application/pdf");
        assert_eq!(media_type_for_path(Path::new("scan.jpeg")), "image/jpeg");
        assert_eq!(
            media_type_for_path(Path::new("noext")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_params_follow_config() {
        let mut config = Config::minimal();
        config.retrieval.top_k = 3;
        config.chunking.size = 200;
        let params = pipeline_params(&config);
        assert_eq!(params.search.limit, 3);
        assert_eq!(params.search.num_candidates, 100);
        assert_eq!(params.chunk_size, 200);
    }
}
