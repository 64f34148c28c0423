//! # Doco Core
//!
//! Runtime-agnostic logic for Doco: the fixed-stride chunker, data models,
//! the collaborator traits (extractor, embedder, chunk store, answer
//! generator), the retrieval-augmented pipeline, and client-side state
//! (history, theme, session state machine).
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! adapters live in the `doco` app crate.

pub mod chunk;
pub mod clock;
pub mod embedding;
pub mod error;
pub mod history;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod session;
pub mod store;

pub use error::PipelineError;
pub use models::{AnalysisResult, Document};
pub use pipeline::{IngestReport, Pipeline, PipelineParams};
