//! Pipeline error taxonomy.
//!
//! Each variant names the stage that failed. Stages fail fast: the first
//! error aborts the remaining work and no stage is retried by the pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("text extraction failed: {0}")]
    Extraction(#[source] anyhow::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("chunk persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("vector search failed: {0}")]
    Search(#[source] anyhow::Error),

    #[error("answer generation failed: {0}")]
    Generation(#[source] anyhow::Error),
}

impl PipelineError {
    /// Stable machine-readable code, used by the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidArgument(_) => "bad_request",
            PipelineError::Extraction(_) => "extraction_failed",
            PipelineError::Embedding(_) => "embedding_failed",
            PipelineError::Persistence(_) => "persistence_failed",
            PipelineError::Search(_) => "search_failed",
            PipelineError::Generation(_) => "generation_failed",
        }
    }
}
