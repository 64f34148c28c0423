//! Embedder trait, embedding purpose, and vector utilities.
//!
//! Embedding services may compute asymmetric vectors for indexed content
//! and for queries. Every call therefore carries an explicit
//! [`EmbeddingPurpose`]; adapters translate it into whatever their backend
//! understands (a task type, a text prefix, or nothing at all).
//!
//! Concrete embedders (Gemini, OpenAI, Ollama, fastembed) live in the
//! `doco` app crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What an embedding will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingPurpose {
    /// Text being indexed into the chunk store.
    Document,
    /// A user question used to search the chunk store.
    Query,
}

impl EmbeddingPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingPurpose::Document => "document",
            EmbeddingPurpose::Query => "query",
        }
    }
}

/// Maps text to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality, or 0 when unknown until the first call.
    fn dims(&self) -> usize;

    /// Embed a batch of texts. Returns one vector per input, in input order.
    async fn embed(&self, texts: &[String], purpose: EmbeddingPurpose) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str, purpose: EmbeddingPurpose) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()], purpose)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Encode a float vector as little-endian `f32` bytes for BLOB storage.
///
/// ```rust
/// use doco_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![0.5f32, -1.0, 2.25];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, and
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
