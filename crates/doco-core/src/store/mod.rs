//! Chunk storage abstraction.
//!
//! The [`ChunkStore`] trait defines every storage operation the pipeline
//! needs: writing embedded chunks, nearest-neighbor search, and TTL
//! housekeeping. Backends: SQLite (app crate) and [`memory::InMemoryStore`].
//!
//! # Expiry
//!
//! Stores stamp `created_at` from their [`Clock`](crate::clock::Clock) and
//! set `expires_at = created_at + ttl`. A chunk whose `expires_at` is at or
//! before the current time is never returned by search, whether or not it
//! has been purged yet.
//!
//! # Partitioning
//!
//! There is one shared retrieval pool. Chunks carry no session or tenant
//! key, so concurrent ingestions land in the same pool and a query may
//! retrieve chunks from any live document.

pub mod memory;

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;

use crate::models::{NewChunk, ScoredChunk};

/// Time-to-live for stored chunks.
pub const DEFAULT_CHUNK_TTL_MINUTES: i64 = 25;

pub fn default_ttl() -> Duration {
    Duration::minutes(DEFAULT_CHUNK_TTL_MINUTES)
}

/// Parameters for a nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorSearchParams {
    /// Size of the candidate pool scanned before the final cut.
    pub num_candidates: usize,
    /// Number of hits returned.
    pub limit: usize,
}

impl Default for VectorSearchParams {
    fn default() -> Self {
        Self {
            num_candidates: 100,
            limit: 5,
        }
    }
}

/// Live and expired chunk counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub live: u64,
    pub expired: u64,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist a single chunk.
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<()>;

    /// Persist a batch of chunks.
    ///
    /// The default writes one chunk at a time, in order, and stops at the
    /// first failure. Chunks already written stay written.
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        for chunk in chunks {
            self.insert_chunk(chunk).await?;
        }
        Ok(())
    }

    /// Return up to `params.limit` live chunks ordered by similarity to
    /// `query` (highest first).
    async fn vector_search(
        &self,
        query: &[f32],
        params: &VectorSearchParams,
    ) -> Result<Vec<ScoredChunk>>;

    /// Delete expired chunks. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Rank `(index, text, embedding)` rows against `query`.
///
/// Shared by the in-memory and SQLite backends: scores every row, keeps the
/// best `num_candidates`, then cuts to `limit`. Ties keep the lower chunk
/// index first so results are deterministic. A NaN score sorts after every
/// finite score.
pub fn rank_candidates<I>(query: &[f32], rows: I, params: &VectorSearchParams) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (i64, String, Vec<f32>)>,
{
    let mut scored: Vec<ScoredChunk> = rows
        .into_iter()
        .map(|(index, text, embedding)| ScoredChunk {
            index,
            text,
            score: crate::embedding::cosine_similarity(query, &embedding),
        })
        .collect();

    scored.sort_by(|a, b| by_score_desc(a.score, b.score).then(a.index.cmp(&b.index)));
    scored.truncate(params.num_candidates);
    scored.truncate(params.limit);
    scored
}

/// Highest score first, NaN last. A total order, unlike `partial_cmp`.
fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}
