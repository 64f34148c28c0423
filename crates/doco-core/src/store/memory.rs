//! In-memory [`ChunkStore`] for tests and single-process use.
//!
//! Chunks live in a `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over the live chunks.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;

use crate::clock::{Clock, SystemClock};
use crate::models::{Chunk, NewChunk, ScoredChunk};

use super::{default_ttl, rank_candidates, ChunkStore, StoreStats, VectorSearchParams};

pub struct InMemoryStore {
    chunks: RwLock<Vec<Chunk>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(default_ttl(), Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            ttl,
            clock,
        }
    }

    /// Snapshot of every stored chunk, expired or not, in insertion order.
    pub fn all_chunks(&self) -> Vec<Chunk> {
        self.chunks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<()> {
        let created_at = self.clock.now();
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        chunks.push(Chunk {
            index: chunk.index,
            text: chunk.text.clone(),
            embedding: chunk.embedding.clone(),
            created_at,
            expires_at: created_at + self.ttl,
        });
        Ok(())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        params: &VectorSearchParams,
    ) -> Result<Vec<ScoredChunk>> {
        let now = self.clock.now();
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let live = chunks
            .iter()
            .filter(|c| !c.is_expired_at(now))
            .map(|c| (c.index, c.text.clone(), c.embedding.clone()));
        Ok(rank_candidates(query, live, params))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        let before = chunks.len();
        chunks.retain(|c| !c.is_expired_at(now));
        Ok((before - chunks.len()) as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let now = self.clock.now();
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let expired = chunks.iter().filter(|c| c.is_expired_at(now)).count() as u64;
        Ok(StoreStats {
            live: chunks.len() as u64 - expired,
            expired,
        })
    }
}
